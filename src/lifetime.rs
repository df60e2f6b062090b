//! Lifetime contexts: the scope tree holding shared instances
//!
//! Every container has a root context. Child contexts enter named sharing boundaries;
//! a part shared within boundary `B` gets one instance per context that entered `B`.
//! Disposing a context releases the instances it created, never those of its ancestors.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::trace;

use crate::contract::Contract;
use crate::descriptor::{CompositeActivator, Instance};
use crate::error::{CompositionError, Result};
use crate::helpers::downcast;
use crate::operation::CompositionOperation;
use crate::registry::ExportDescriptorRegistry;

/// Identity of a shared part within the instance cache of a context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SharingId(usize);

impl SharingId {
    /// Derive an id from the address of the owner, which must outlive every use of the id
    pub(crate) fn of<T>(owner: &Arc<T>) -> Self {
        SharingId(Arc::as_ptr(owner) as *const () as usize)
    }
}

enum SlotState {
    Empty,
    Activating,
    Ready(Instance),
}

struct SharedSlot {
    state: ReentrantMutex<RefCell<SlotState>>,
}

impl SharedSlot {
    fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(SlotState::Empty)),
        }
    }
}

type ReleaseAction = Box<dyn FnOnce() + Send>;

struct ContextInner {
    registry: Arc<ExportDescriptorRegistry>,
    parent: Option<LifetimeContext>,
    boundaries: Vec<String>,
    slots: Mutex<HashMap<SharingId, Arc<SharedSlot>>>,
    bound: Mutex<Vec<ReleaseAction>>,
    disposed: AtomicBool,
}

/// A node of the scope tree
#[derive(Clone)]
pub struct LifetimeContext {
    inner: Arc<ContextInner>,
}

impl LifetimeContext {
    pub(crate) fn root(registry: Arc<ExportDescriptorRegistry>) -> Self {
        Self::create(registry, None, Vec::new())
    }

    fn create(registry: Arc<ExportDescriptorRegistry>, parent: Option<LifetimeContext>, boundaries: Vec<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registry,
                parent,
                boundaries,
                slots: Mutex::new(HashMap::new()),
                bound: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Open a child context entering the given sharing boundaries
    pub fn begin_scope<S: AsRef<str>>(&self, boundaries: &[S]) -> LifetimeContext {
        let boundaries = boundaries.iter().map(|b| b.as_ref().to_string()).collect();
        Self::create(self.inner.registry.clone(), Some(self.clone()), boundaries)
    }

    pub fn parent(&self) -> Option<&LifetimeContext> {
        self.inner.parent.as_ref()
    }

    pub fn sharing_boundaries(&self) -> &[String] {
        &self.inner.boundaries
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// True if both handles designate the same context
    pub fn ptr_eq(&self, other: &LifetimeContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn registry(&self) -> &Arc<ExportDescriptorRegistry> {
        &self.inner.registry
    }

    /// Nearest context, starting from this one, that owns the boundary.
    ///
    /// Without a boundary, this is the root context.
    pub fn find_context_within(&self, boundary: Option<&str>) -> Result<LifetimeContext> {
        let mut current = self;
        match boundary {
            None => {
                while let Some(parent) = current.parent() {
                    current = parent;
                }
                Ok(current.clone())
            }
            Some(name) => loop {
                if current.inner.boundaries.iter().any(|b| b == name) {
                    return Ok(current.clone());
                }
                match current.parent() {
                    Some(parent) => current = parent,
                    None => return Err(CompositionError::SharingBoundaryNotFound(name.to_string())),
                }
            },
        }
    }

    /// Return the instance cached for `id`, activating it in this context on first use.
    ///
    /// Concurrent first requests block until the single activation finishes. A request
    /// issued by the activation itself fails instead of deadlocking.
    pub fn get_or_create(
        &self,
        id: SharingId,
        origin: &str,
        operation: &CompositionOperation,
        activator: &CompositeActivator,
    ) -> Result<Instance> {
        self.ensure_live()?;
        let slot = self
            .inner
            .slots
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(SharedSlot::new()))
            .clone();

        let guard = slot.state.lock();
        match &*guard.borrow() {
            SlotState::Ready(instance) => return Ok(instance.clone()),
            SlotState::Activating => {
                return Err(CompositionError::ReentrantActivation {
                    origin: origin.to_string(),
                })
            }
            SlotState::Empty => {}
        }

        *guard.borrow_mut() = SlotState::Activating;
        let result = activator(self, operation);
        *guard.borrow_mut() = match &result {
            Ok(instance) => {
                trace!(origin, boundaries = ?self.inner.boundaries, "created shared instance");
                SlotState::Ready(instance.clone())
            }
            Err(_) => SlotState::Empty,
        };
        result
    }

    /// Register an action releasing an instance created in this context
    pub fn add_bound_instance(&self, release: impl FnOnce() + Send + 'static) {
        self.inner.bound.lock().push(Box::new(release));
    }

    /// Release every instance created in this context.
    ///
    /// Ancestors are unaffected. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let bound = std::mem::take(&mut *self.inner.bound.lock());
        trace!(released = bound.len(), boundaries = ?self.inner.boundaries, "disposing lifetime context");
        for release in bound {
            release();
        }
        self.inner.slots.lock().clear();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(CompositionError::ContextDisposed);
        }
        Ok(())
    }
}

impl fmt::Debug for LifetimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeContext")
            .field("boundaries", &self.inner.boundaries)
            .field("has_parent", &self.inner.parent.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Retrieve exports from a context
pub trait CompositionContext {
    /// Activate the single export of a contract, if there is one.
    ///
    /// Fails if several exports match a singular contract.
    fn try_get_export(&self, contract: &Contract) -> Result<Option<Instance>>;

    /// Activate the single export of a contract
    fn get_export(&self, contract: &Contract) -> Result<Instance> {
        self.try_get_export(contract)?
            .ok_or_else(|| CompositionError::cardinality(contract, 0))
    }

    /// Activate the single export of a contract as a concrete type
    fn get<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Arc<T>> {
        downcast(self.get_export(contract)?, contract)
    }

    /// Activate the export of a contract as a concrete type, if there is one
    fn try_get<T: Any + Send + Sync>(&self, contract: &Contract) -> Result<Option<Arc<T>>> {
        match self.try_get_export(contract)? {
            Some(instance) => downcast(instance, contract).map(Some),
            None => Ok(None),
        }
    }

    /// Activate every export of a contract, in discovery order
    fn get_many(&self, contract: &Contract) -> Result<Vec<Instance>> {
        let many = contract.clone().many();
        let items: Arc<Vec<Instance>> = self.get(&many)?;
        Ok(items.as_ref().clone())
    }
}

impl CompositionContext for LifetimeContext {
    fn try_get_export(&self, contract: &Contract) -> Result<Option<Instance>> {
        self.ensure_live()?;
        match self.inner.registry.try_get_single(contract)? {
            Some(descriptor) => CompositionOperation::run(self, descriptor.activator()).map(Some),
            None => Ok(None),
        }
    }
}
