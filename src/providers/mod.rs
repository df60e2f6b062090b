//! Export descriptor providers
//!
//! A provider is a strategy answering a contract with zero or more promises. The registry
//! runs every provider for every contract, so strategies compose: a deferred, ordered,
//! many-valued import is claimed first by the deferred provider, whose target is then
//! claimed by the ordering provider, whose elements are claimed by the part provider.
//!
//! Built-in strategies decline contracts whose shape or constraints they do not own.
//! Wrapping strategies (deferred, factory) enumerate the exports of the wrapped
//! contract through a [DependencyAccessor] and emit one wrapper per export, carrying
//! that export's origin and metadata, so they nest inside the collection strategies.

mod current_scope;
mod deferred;
mod factory;
mod import_many;
mod keyed;
mod ordered;

use std::sync::Arc;

use crate::contract::Contract;
use crate::descriptor::{ExportDescriptorPromise, ExportTarget};
use crate::error::Result;

pub use current_scope::CurrentScopeExportDescriptorProvider;
pub use deferred::{Deferred, DeferredExportDescriptorProvider};
pub use factory::{Export, ExportFactory, ExportFactoryExportDescriptorProvider};
pub use import_many::ImportManyExportDescriptorProvider;
pub use keyed::{KeyedExportDescriptorProvider, KeyedExports};
pub use ordered::OrderedImportManyExportDescriptorProvider;

/// View of the resolution session offered to providers
pub trait DependencyAccessor {
    /// Every export of the contract in discovery order, known without resolving any of
    /// their dependencies
    fn exports_of(&mut self, contract: &Contract) -> Result<Vec<ExportTarget>>;
}

/// Strategy producing export promises for a contract
pub trait ExportDescriptorProvider: Send + Sync {
    /// Promises of exports satisfying the contract, empty if the contract is not supported
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        accessor: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>>;
}

/// Providers every container runs before the user-supplied ones
pub(crate) fn builtin_providers() -> Vec<Arc<dyn ExportDescriptorProvider>> {
    vec![
        Arc::new(DeferredExportDescriptorProvider),
        Arc::new(ExportFactoryExportDescriptorProvider),
        Arc::new(ImportManyExportDescriptorProvider),
        Arc::new(OrderedImportManyExportDescriptorProvider),
        Arc::new(KeyedExportDescriptorProvider),
        Arc::new(CurrentScopeExportDescriptorProvider),
    ]
}
