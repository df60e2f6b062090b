use std::sync::Arc;

use crate::contract::{Contract, ContractType, ORDER_BY_METADATA};
use crate::descriptor::{
    CompositeActivator, DependencyRequest, ExportDescriptor, ExportDescriptorPromise, Instance,
};
use crate::error::Result;
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Claims unordered `Many<T>` contracts.
///
/// Activates every export of `T` in discovery order into a `Vec<Instance>`.
pub struct ImportManyExportDescriptorProvider;

impl ExportDescriptorProvider for ImportManyExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        let ContractType::Many(element) = contract.contract_type() else {
            return Ok(Vec::new());
        };
        if contract.constraints().contains_key(ORDER_BY_METADATA) {
            return Ok(Vec::new());
        }
        let element_contract = contract.change_type(element.as_ref().clone());
        Ok(vec![import_many_promise(contract, element_contract, |targets| Ok(targets))])
    }
}

/// Promise of a `Vec<Instance>` export over every export of `element_contract`.
///
/// `arrange` may reorder or reject the targets when the promise is finalized.
pub(crate) fn import_many_promise<F>(
    contract: &Contract,
    element_contract: Contract,
    arrange: F,
) -> ExportDescriptorPromise
where
    F: FnOnce(Vec<Arc<ExportDescriptor>>) -> Result<Vec<Arc<ExportDescriptor>>> + Send + 'static,
{
    let dependency = DependencyRequest::many("item", element_contract);
    ExportDescriptorPromise::new(
        contract.clone(),
        &contract.contract_type().to_string(),
        false,
        move || Ok(vec![dependency]),
        move |deps| {
            let targets = deps.get("item").map(|d| d.targets.clone()).unwrap_or_default();
            let targets = arrange(targets)?;
            let activator: CompositeActivator =
                Arc::new(move |context: &LifetimeContext, operation: &CompositionOperation| {
                    let items = targets
                        .iter()
                        .map(|target| target.activate(context, operation))
                        .collect::<Result<Vec<Instance>>>()?;
                    Ok(Arc::new(items) as Instance)
                });
            Ok(activator)
        },
    )
}
