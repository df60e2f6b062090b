use std::sync::Arc;

use crate::contract::{Contract, ContractType, MetadataValue, ORDER_BY_METADATA};
use crate::descriptor::{ExportDescriptor, ExportDescriptorPromise};
use crate::error::{CompositionError, Result};
use crate::helpers::readable_quoted_list;
use crate::providers::import_many::import_many_promise;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Claims `Many<T>` contracts constrained with `OrderMetadataName`.
///
/// Every contributing export must carry a non-null value for the named metadata item;
/// contributors are sorted ascending by that value, ties keeping discovery order.
pub struct OrderedImportManyExportDescriptorProvider;

impl ExportDescriptorProvider for OrderedImportManyExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        let ContractType::Many(element) = contract.contract_type() else {
            return Ok(Vec::new());
        };
        let Some((key, unwrapped)) = contract.try_unwrap_constraint(ORDER_BY_METADATA) else {
            return Ok(Vec::new());
        };
        let key = metadata_name(key);
        let element_contract = unwrapped.change_type(element.as_ref().clone());

        Ok(vec![import_many_promise(contract, element_contract, move |targets| {
            order_by_metadata(targets, &key)
        })])
    }
}

pub(crate) fn metadata_name(value: MetadataValue) -> String {
    match value {
        MetadataValue::Str(name) => name,
        other => other.to_string(),
    }
}

fn order_by_metadata(
    mut targets: Vec<Arc<ExportDescriptor>>,
    key: &str,
) -> Result<Vec<Arc<ExportDescriptor>>> {
    let missing: Vec<&str> = targets
        .iter()
        .filter(|t| t.metadata().get(key).map_or(true, MetadataValue::is_null))
        .map(|t| t.origin())
        .collect();
    if !missing.is_empty() {
        return Err(CompositionError::MissingOrderingMetadata {
            key: key.to_string(),
            origins: readable_quoted_list(missing),
        });
    }

    // stable: equal keys keep discovery order
    targets.sort_by(|a, b| a.metadata()[key].cmp(&b.metadata()[key]));
    Ok(targets)
}
