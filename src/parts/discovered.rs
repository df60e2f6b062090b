use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::contract::ContractType;
use crate::descriptor::{CompositeActivator, DependencyRequest, ResolvedDependencies};
use crate::error::{CompositionError, Result};
use crate::lifetime::{LifetimeContext, SharingId};
use crate::operation::CompositionOperation;
use crate::parts::{ConstructorDescriptor, PartDescriptor};

/// Runtime state of a part: selected constructor, compiled activator and, for open
/// generics, the argument lists already closed.
pub(crate) struct DiscoveredPart {
    descriptor: PartDescriptor,
    constructor: OnceCell<usize>,
    activator: OnceCell<CompositeActivator>,
    // Grows with every distinct argument list; never pruned.
    applied_arguments: Mutex<HashSet<Vec<ContractType>>>,
}

impl DiscoveredPart {
    pub(crate) fn new(descriptor: PartDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            constructor: OnceCell::new(),
            activator: OnceCell::new(),
            applied_arguments: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn descriptor(&self) -> &PartDescriptor {
        &self.descriptor
    }

    pub(crate) fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn constructor(&self) -> Result<&ConstructorDescriptor> {
        let index = self
            .constructor
            .get_or_try_init(|| select_constructor(&self.descriptor))?;
        Ok(&self.descriptor.constructors[*index])
    }

    /// Constructor parameters first, then property imports
    pub(crate) fn dependencies(&self) -> Result<Vec<DependencyRequest>> {
        let constructor = self.constructor()?;
        let parameters = constructor.parameters().iter().map(|p| {
            if p.allow_default {
                DependencyRequest::optional(&p.name, p.contract.clone())
            } else {
                DependencyRequest::required(&p.name, p.contract.clone())
            }
        });
        let properties = self.descriptor.properties.iter().map(|p| {
            if p.allow_default {
                DependencyRequest::optional(&p.name, p.contract.clone())
            } else {
                DependencyRequest::required(&p.name, p.contract.clone())
            }
        });
        Ok(parameters.chain(properties).collect())
    }

    /// Activator shared by every export of the part, built on first request
    pub(crate) fn activator(self: &Arc<Self>, dependencies: &ResolvedDependencies) -> Result<CompositeActivator> {
        self.activator
            .get_or_try_init(|| self.build_activator(dependencies))
            .cloned()
    }

    fn build_activator(self: &Arc<Self>, dependencies: &ResolvedDependencies) -> Result<CompositeActivator> {
        let constructor = self.constructor()?.clone();
        let parameter_count = constructor.parameters().len();

        let arguments: Vec<Option<CompositeActivator>> = dependencies
            .iter()
            .take(parameter_count)
            .map(|d| d.target().map(|t| t.activator().clone()))
            .collect();
        let properties: Vec<_> = dependencies
            .iter()
            .skip(parameter_count)
            .zip(self.descriptor.properties.iter())
            .filter_map(|(d, p)| d.target().map(|t| (t.activator().clone(), p.setter.clone())))
            .collect();
        let on_imports_satisfied = self.descriptor.on_imports_satisfied.clone();
        let on_release = self.descriptor.on_release.clone();

        let activator: CompositeActivator =
            Arc::new(move |context: &LifetimeContext, operation: &CompositionOperation| {
                let mut args = Vec::with_capacity(arguments.len());
                for argument in &arguments {
                    args.push(match argument {
                        Some(activator) => Some(activator(context, operation)?),
                        None => None,
                    });
                }
                let instance = constructor.invoke(args)?;

                for (activator, setter) in &properties {
                    setter(&instance, activator(context, operation)?)?;
                }
                if let Some(release) = &on_release {
                    let (release, target) = (release.clone(), instance.clone());
                    context.add_bound_instance(move || release(&target));
                }
                if let Some(hook) = &on_imports_satisfied {
                    let (hook, target) = (hook.clone(), instance.clone());
                    operation.add_post_composition_action(move || hook(&target));
                }
                Ok(instance)
            });

        if !self.descriptor.is_shared() {
            return Ok(activator);
        }

        let id = SharingId::of(self);
        let boundary = self.descriptor.sharing_boundary().map(str::to_string);
        let origin = self.name().to_string();
        Ok(Arc::new(move |context: &LifetimeContext, operation: &CompositionOperation| {
            context
                .find_context_within(boundary.as_deref())?
                .get_or_create(id, &origin, operation, &activator)
        }))
    }

    /// Derive the closed part for the given type arguments.
    ///
    /// Returns `None` if these arguments were already applied.
    pub(crate) fn try_close(&self, arguments: &[ContractType]) -> Result<Option<Arc<DiscoveredPart>>> {
        let Some(generic) = &self.descriptor.generic else {
            return Ok(None);
        };
        if generic.arity != arguments.len() {
            return Err(CompositionError::GenericArityMismatch {
                part: self.name().to_string(),
                expected: generic.arity,
                supplied: arguments.len(),
            });
        }

        let mut applied = self.applied_arguments.lock();
        if applied.contains(arguments) {
            return Ok(None);
        }
        let closed = (generic.close)(arguments)?;
        applied.insert(arguments.to_vec());
        Ok(Some(DiscoveredPart::new(closed)))
    }
}

fn select_constructor(part: &PartDescriptor) -> Result<usize> {
    let public = || part.constructors.iter().enumerate().filter(|(_, c)| c.is_public());

    let mut candidates: Vec<usize> = public().filter(|(_, c)| c.is_importing()).map(|(i, _)| i).collect();
    if candidates.is_empty() {
        candidates = public()
            .filter(|(_, c)| c.parameters().is_empty())
            .map(|(i, _)| i)
            .collect();
    }

    let index = match candidates.as_slice() {
        [index] => *index,
        [] => {
            return Err(CompositionError::NoImportingConstructor {
                part: part.name().to_string(),
            })
        }
        _ => {
            return Err(CompositionError::AmbiguousConstructor {
                part: part.name().to_string(),
            })
        }
    };

    let constructor = &part.constructors[index];
    if constructor.arity != constructor.parameters().len() {
        return Err(CompositionError::Activation(format!(
            "constructor of part '{}' takes {} argument(s) but declares {} import(s)",
            part.name(),
            constructor.arity,
            constructor.parameters().len()
        )));
    }
    let mismatched = constructor
        .parameters()
        .iter()
        .zip(&constructor.accepts_absent)
        .find(|(parameter, accepts_absent)| parameter.allow_default && !**accepts_absent);
    if let Some((parameter, _)) = mismatched {
        return Err(CompositionError::NonOptionalParameter {
            part: part.name().to_string(),
            parameter: parameter.name.clone(),
        });
    }
    Ok(index)
}
