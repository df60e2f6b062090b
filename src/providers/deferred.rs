use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::contract::{Contract, ContractType, Metadata};
use crate::descriptor::{
    CompositeActivator, DependencyRequest, ExportDescriptor, ExportDescriptorPromise, ExportTarget, Instance,
};
use crate::error::Result;
use crate::helpers::downcast;
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Handle resolving one export on first use.
///
/// The target is activated at most once, in the context where the handle was created,
/// no matter how many threads force it concurrently.
pub struct Deferred {
    context: LifetimeContext,
    target: ExportTarget,
    descriptor: OnceCell<Arc<ExportDescriptor>>,
    value: OnceCell<Instance>,
}

impl Deferred {
    fn new(context: LifetimeContext, target: ExportTarget) -> Self {
        Self {
            context,
            target,
            descriptor: OnceCell::new(),
            value: OnceCell::new(),
        }
    }

    pub fn target(&self) -> &Contract {
        &self.target.contract
    }

    /// Name of the part or provider behind the target export
    pub fn origin(&self) -> &str {
        &self.target.origin
    }

    pub fn is_forced(&self) -> bool {
        self.value.get().is_some()
    }

    /// Activate the target on first call, return the memoized instance afterwards
    pub fn force(&self) -> Result<Instance> {
        self.value
            .get_or_try_init(|| {
                let descriptor = self
                    .descriptor
                    .get_or_try_init(|| self.target.descriptor(self.context.registry()))?;
                CompositionOperation::run(&self.context, descriptor.activator())
            })
            .cloned()
    }

    /// Force the target and recover its concrete type
    pub fn get<T: std::any::Any + Send + Sync>(&self) -> Result<Arc<T>> {
        downcast(self.force()?, &self.target.contract)
    }

    /// Static metadata of the target export, available without activating it
    pub fn metadata(&self) -> &Metadata {
        &self.target.metadata
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("target", &self.target.contract)
            .field("origin", &self.target.origin)
            .field("forced", &self.is_forced())
            .finish()
    }
}

/// Claims `Deferred<T>` contracts, one wrapper per export of `T`.
///
/// Each wrapper carries the origin and metadata of its export. The dependency on `T`
/// is not a prerequisite: the wrapper can be built while `T` is still being resolved,
/// which breaks construction cycles.
pub struct DeferredExportDescriptorProvider;

impl ExportDescriptorProvider for DeferredExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        accessor: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        let ContractType::Deferred(inner) = contract.contract_type() else {
            return Ok(Vec::new());
        };
        let targets = accessor.exports_of(&contract.change_type(inner.as_ref().clone()))?;

        Ok(targets
            .into_iter()
            .map(|target| {
                let (origin, metadata) = (target.origin.clone(), target.metadata.clone());
                let dependency = DependencyRequest::many("value", target.contract.clone()).non_prerequisite();
                ExportDescriptorPromise::new(
                    contract.clone(),
                    &origin,
                    false,
                    move || Ok(vec![dependency]),
                    move |_| {
                        let activator: CompositeActivator =
                            Arc::new(move |context: &LifetimeContext, _: &CompositionOperation| {
                                Ok(Arc::new(Deferred::new(context.clone(), target.clone())) as Instance)
                            });
                        Ok(activator)
                    },
                )
                .with_metadata(metadata)
            })
            .collect())
    }
}
