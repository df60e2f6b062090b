//! Lightweight composition engine: contract matching, provider pipeline, lazy dependency
//! graph resolution with cycle detection, and scoped instance sharing.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use trellis::*;
//! // Define parts
//! struct Greeting(String);
//!
//! struct Greeter {
//!     greeting: Arc<Greeting>,
//! }
//!
//! impl Greeter {
//!     fn new(greeting: Arc<Greeting>) -> Self {
//!         Self { greeting }
//!     }
//!
//!     fn greet(&self) -> String {
//!         format!("{} world", self.greeting.0)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! // Describe them and build a container
//! let host = ContainerConfiguration::new()
//!     .with_part(
//!         PartDescriptor::new("Greeting")
//!             .export(Contract::named("Greeting"))
//!             .shared()
//!             .constructor(ConstructorDescriptor::new(vec![], || Greeting("Hello".into()))),
//!     )
//!     .with_part(export_part!(
//!         "Greeter" => [Contract::named("Greeter")],
//!         Greeter::new,
//!         greeting: Contract::named("Greeting")
//!     ))
//!     .create_container();
//!
//! let greeter: Arc<Greeter> = host.get(&Contract::named("Greeter"))?;
//! assert_eq!(greeter.greet(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! * A [Contract] identifies a capability: a [ContractType] plus ordered metadata
//!   constraints. Wrapper shapes (`Deferred`, `Many`, `Keyed`, `Factory`, `Scope`) are
//!   claimed by built-in providers.
//! * An [ExportDescriptorProvider] answers a contract with [ExportDescriptorPromise]s.
//!   Promises first declare their dependencies, then are finalized into an
//!   [ExportDescriptor] holding the activator once those dependencies are resolved.
//!   Wrapping providers see the exports of the wrapped contract through a
//!   [DependencyAccessor] and wrap each one separately, keeping its metadata.
//! * The [ExportDescriptorRegistry] resolves each contract once, detecting cycles among
//!   prerequisite dependencies, and publishes results copy-on-write.
//! * A [LifetimeContext] activates descriptors and caches shared instances per sharing
//!   boundary. Declared parts enter the pipeline through [ContainerConfiguration].

mod contract;
mod descriptor;
mod error;
mod helpers;
mod host;
mod inject;
mod lifetime;
mod operation;
mod parts;
mod providers;
mod registry;
mod resolve;

pub use contract::{
    Contract, ContractType, Metadata, MetadataValue, IS_SHARED, KEY_BY_METADATA, ORDER_BY_METADATA,
    SHARING_BOUNDARY, SHARING_BOUNDARY_NAMES,
};
pub use descriptor::{
    CompositeActivator, CompositionDependency, DependencyRequest, ExportDescriptor, ExportDescriptorPromise,
    ExportTarget, ImportCardinality, Instance, ResolvedDependencies,
};
pub use error::{CompositionError, Result};
pub use host::{CompositionHost, ContainerConfiguration};
pub use inject::{Constructor, Injected};
pub use lifetime::{CompositionContext, LifetimeContext, SharingId};
pub use operation::CompositionOperation;
pub use parts::{
    ConstructorDescriptor, ExportDeclaration, ParameterImport, Part, PartDescriptor, PropertyImport,
    TypedPartExportDescriptorProvider,
};
pub use providers::{
    CurrentScopeExportDescriptorProvider, Deferred, DeferredExportDescriptorProvider, DependencyAccessor, Export,
    ExportDescriptorProvider,
    ExportFactory, ExportFactoryExportDescriptorProvider, ImportManyExportDescriptorProvider, KeyedExportDescriptorProvider,
    KeyedExports, OrderedImportManyExportDescriptorProvider,
};
pub use registry::{ExportDescriptorRegistry, ExportDescriptors};

#[cfg(test)]
mod tests;
