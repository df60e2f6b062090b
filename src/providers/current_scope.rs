use std::sync::Arc;

use crate::contract::{Contract, ContractType};
use crate::descriptor::{CompositeActivator, ExportDescriptorPromise, Instance};
use crate::error::Result;
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Claims the unconstrained `Scope` contract: the activating [LifetimeContext] itself
pub struct CurrentScopeExportDescriptorProvider;

impl ExportDescriptorProvider for CurrentScopeExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        if *contract.contract_type() != ContractType::Scope || !contract.constraints().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ExportDescriptorPromise::without_dependencies(
            contract.clone(),
            "CurrentScope",
            false,
            |_| {
                let activator: CompositeActivator =
                    Arc::new(|context: &LifetimeContext, _: &CompositionOperation| {
                        Ok(Arc::new(context.clone()) as Instance)
                    });
                Ok(activator)
            },
        )])
    }
}
