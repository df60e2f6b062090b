//! Export descriptors and the two-phase promises that produce them
//!
//! A provider answers a contract with [ExportDescriptorPromise]s. Each promise first
//! declares the [DependencyRequest]s its export would need, then, once the resolution
//! session has resolved them, is finalized into the activator of an immutable
//! [ExportDescriptor]. Origin and static metadata are known from the start, so other
//! providers can see them as [ExportTarget]s before any dependency is resolved.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::contract::{Contract, Metadata};
use crate::error::{CompositionError, Result};
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::registry::ExportDescriptorRegistry;

/// Type-erased instance produced by an activator
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Instance-producing function bound to its resolved dependencies
pub type CompositeActivator =
    Arc<dyn Fn(&LifetimeContext, &CompositionOperation) -> Result<Instance> + Send + Sync>;

type DependencyEnumerator = Box<dyn FnOnce() -> Result<Vec<DependencyRequest>> + Send>;
type Finalizer = Box<dyn FnOnce(&ResolvedDependencies) -> Result<CompositeActivator> + Send>;

/// Finished export: activator plus static metadata
#[derive(Clone)]
pub struct ExportDescriptor {
    activator: CompositeActivator,
    metadata: Arc<Metadata>,
    origin: Arc<str>,
}

impl ExportDescriptor {
    pub fn activator(&self) -> &CompositeActivator {
        &self.activator
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Name of the part or provider this export came from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Invoke the activator
    pub fn activate(&self, context: &LifetimeContext, operation: &CompositionOperation) -> Result<Instance> {
        (self.activator)(context, operation)
    }

    pub(crate) fn assemble(activator: CompositeActivator, metadata: Arc<Metadata>, origin: &str) -> Self {
        Self {
            activator,
            metadata,
            origin: Arc::from(origin),
        }
    }
}

impl fmt::Debug for ExportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptor")
            .field("origin", &self.origin)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// One export of a contract, as seen by a provider while promises are being built.
///
/// Identifies the export by position within its contract; the descriptor itself is
/// looked up through the registry once the session that discovered it has published.
#[derive(Clone, Debug)]
pub struct ExportTarget {
    pub contract: Contract,
    pub index: usize,
    pub origin: Arc<str>,
    pub metadata: Arc<Metadata>,
}

impl ExportTarget {
    pub(crate) fn of_descriptor(contract: &Contract, index: usize, descriptor: &ExportDescriptor) -> Self {
        Self {
            contract: contract.clone(),
            index,
            origin: descriptor.origin.clone(),
            metadata: descriptor.metadata.clone(),
        }
    }

    pub(crate) fn of_promise(contract: &Contract, index: usize, promise: &ExportDescriptorPromise) -> Self {
        Self {
            contract: contract.clone(),
            index,
            origin: Arc::from(promise.origin()),
            metadata: promise.metadata.clone(),
        }
    }

    /// The published descriptor of this export
    pub(crate) fn descriptor(&self, registry: &ExportDescriptorRegistry) -> Result<Arc<ExportDescriptor>> {
        registry
            .resolve(&self.contract)?
            .get(self.index)
            .cloned()
            .ok_or_else(|| CompositionError::cardinality(&self.contract, 0))
    }
}

/// How many exports an import accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportCardinality {
    /// Exactly one
    Required,
    /// Zero or one
    Optional,
    /// Any number
    Many,
}

/// Edge declared by a promise: the consuming site and the contract it needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyRequest {
    pub site: String,
    pub contract: Contract,
    pub cardinality: ImportCardinality,
    /// Prerequisite edges must be resolved before the consumer and must not form a cycle
    pub prerequisite: bool,
}

impl DependencyRequest {
    pub fn required(site: &str, contract: Contract) -> Self {
        Self::new(site, contract, ImportCardinality::Required)
    }

    pub fn optional(site: &str, contract: Contract) -> Self {
        Self::new(site, contract, ImportCardinality::Optional)
    }

    pub fn many(site: &str, contract: Contract) -> Self {
        Self::new(site, contract, ImportCardinality::Many)
    }

    fn new(site: &str, contract: Contract, cardinality: ImportCardinality) -> Self {
        Self {
            site: site.to_string(),
            contract,
            cardinality,
            prerequisite: true,
        }
    }

    /// Mark the edge as satisfiable after the consumer is built
    pub fn non_prerequisite(mut self) -> Self {
        self.prerequisite = false;
        self
    }
}

/// A dependency after resolution.
///
/// Prerequisite dependencies carry their target descriptors in discovery order.
/// Non-prerequisite dependencies are validated by the session but carry no targets:
/// consumers look them up through the registry when they need them.
#[derive(Clone, Debug)]
pub struct CompositionDependency {
    pub request: DependencyRequest,
    pub targets: Vec<Arc<ExportDescriptor>>,
}

impl CompositionDependency {
    pub fn site(&self) -> &str {
        &self.request.site
    }

    pub fn contract(&self) -> &Contract {
        &self.request.contract
    }

    /// The single target, if any
    pub fn target(&self) -> Option<&Arc<ExportDescriptor>> {
        self.targets.first()
    }
}

/// Dependencies of one promise, in declaration order
#[derive(Clone, Debug, Default)]
pub struct ResolvedDependencies(Vec<CompositionDependency>);

impl ResolvedDependencies {
    pub(crate) fn new(deps: Vec<CompositionDependency>) -> Self {
        Self(deps)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompositionDependency> {
        self.0.iter()
    }

    /// First dependency declared for the given site
    pub fn get(&self, site: &str) -> Option<&CompositionDependency> {
        self.0.iter().find(|d| d.site() == site)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deferred export candidate.
///
/// Both closures are consumed: the session calls each at most once.
pub struct ExportDescriptorPromise {
    contract: Contract,
    origin: String,
    is_shared: bool,
    metadata: Arc<Metadata>,
    dependencies: DependencyEnumerator,
    finalize: Finalizer,
}

impl ExportDescriptorPromise {
    pub fn new<D, F>(contract: Contract, origin: &str, is_shared: bool, dependencies: D, finalize: F) -> Self
    where
        D: FnOnce() -> Result<Vec<DependencyRequest>> + Send + 'static,
        F: FnOnce(&ResolvedDependencies) -> Result<CompositeActivator> + Send + 'static,
    {
        Self {
            contract,
            origin: origin.to_string(),
            is_shared,
            metadata: Arc::new(Metadata::new()),
            dependencies: Box::new(dependencies),
            finalize: Box::new(finalize),
        }
    }

    /// Promise of an export with no dependencies
    pub fn without_dependencies<F>(contract: Contract, origin: &str, is_shared: bool, finalize: F) -> Self
    where
        F: FnOnce(&ResolvedDependencies) -> Result<CompositeActivator> + Send + 'static,
    {
        Self::new(contract, origin, is_shared, || Ok(Vec::new()), finalize)
    }

    /// Static metadata of the promised export
    pub fn with_metadata(mut self, metadata: impl Into<Arc<Metadata>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn into_parts(self) -> (String, Arc<Metadata>, DependencyEnumerator, Finalizer) {
        (self.origin, self.metadata, self.dependencies, self.finalize)
    }
}

impl fmt::Debug for ExportDescriptorPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptorPromise")
            .field("contract", &self.contract)
            .field("origin", &self.origin)
            .field("is_shared", &self.is_shared)
            .field("metadata", &self.metadata)
            .finish()
    }
}
