use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use crate::descriptor::{CompositeActivator, Instance};
use crate::error::Result;
use crate::lifetime::LifetimeContext;

type PostCompositionAction = Box<dyn FnOnce() -> Result<()>>;

/// State of one top-level activation.
///
/// Actions queued during the activation run in order once the outermost activator has
/// returned, so they observe a fully constructed graph.
pub struct CompositionOperation {
    post_composition: RefCell<VecDeque<PostCompositionAction>>,
}

impl CompositionOperation {
    fn new() -> Self {
        Self {
            post_composition: RefCell::new(VecDeque::new()),
        }
    }

    /// Activate an export in the given context, then run the queued actions
    pub fn run(context: &LifetimeContext, activator: &CompositeActivator) -> Result<Instance> {
        let operation = CompositionOperation::new();
        let instance = activator(context, &operation)?;
        operation.complete()?;
        Ok(instance)
    }

    /// Queue an action to run after the whole activation completes
    pub fn add_post_composition_action(&self, action: impl FnOnce() -> Result<()> + 'static) {
        self.post_composition.borrow_mut().push_back(Box::new(action));
    }

    fn complete(&self) -> Result<()> {
        // actions may queue further actions
        loop {
            let next = self.post_composition.borrow_mut().pop_front();
            match next {
                Some(action) => action()?,
                None => return Ok(()),
            }
        }
    }
}

impl fmt::Debug for CompositionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionOperation")
            .field("pending_actions", &self.post_composition.borrow().len())
            .finish()
    }
}
