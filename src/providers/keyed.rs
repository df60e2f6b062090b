use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::{Contract, ContractType, MetadataValue, KEY_BY_METADATA};
use crate::descriptor::{
    CompositeActivator, DependencyRequest, ExportDescriptor, ExportDescriptorPromise, Instance,
};
use crate::error::{CompositionError, Result};
use crate::helpers::readable_quoted_list;
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::providers::ordered::metadata_name;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Instances of a keyed import, by metadata value
pub type KeyedExports = BTreeMap<MetadataValue, Instance>;

/// Claims `Keyed<T>` contracts constrained with `KeyMetadataName`
pub struct KeyedExportDescriptorProvider;

impl ExportDescriptorProvider for KeyedExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        let ContractType::Keyed(element) = contract.contract_type() else {
            return Ok(Vec::new());
        };
        let Some((key, unwrapped)) = contract.try_unwrap_constraint(KEY_BY_METADATA) else {
            return Ok(Vec::new());
        };
        let key = metadata_name(key);
        let dependency = DependencyRequest::many("item", unwrapped.change_type(element.as_ref().clone()));

        Ok(vec![ExportDescriptorPromise::new(
            contract.clone(),
            &contract.contract_type().to_string(),
            false,
            move || Ok(vec![dependency]),
            move |deps| {
                let targets = deps.get("item").map(|d| d.targets.clone()).unwrap_or_default();
                let entries = key_by_metadata(targets, &key)?;
                let activator: CompositeActivator =
                    Arc::new(move |context: &LifetimeContext, operation: &CompositionOperation| {
                        let mut map = KeyedExports::new();
                        for (value, target) in &entries {
                            map.insert(value.clone(), target.activate(context, operation)?);
                        }
                        Ok(Arc::new(map) as Instance)
                    });
                Ok(activator)
            },
        )])
    }
}

fn key_by_metadata(
    targets: Vec<Arc<ExportDescriptor>>,
    key: &str,
) -> Result<Vec<(MetadataValue, Arc<ExportDescriptor>)>> {
    let missing: Vec<&str> = targets
        .iter()
        .filter(|t| t.metadata().get(key).map_or(true, MetadataValue::is_null))
        .map(|t| t.origin())
        .collect();
    if !missing.is_empty() {
        return Err(CompositionError::MissingKeyMetadata {
            key: key.to_string(),
            origins: readable_quoted_list(missing),
        });
    }

    let mut seen: BTreeMap<&MetadataValue, &str> = BTreeMap::new();
    for target in &targets {
        let value = &target.metadata()[key];
        if let Some(first) = seen.insert(value, target.origin()) {
            return Err(CompositionError::DuplicateKey {
                key: key.to_string(),
                value: value.to_string(),
                first: first.to_string(),
                second: target.origin().to_string(),
            });
        }
    }

    Ok(targets
        .iter()
        .map(|t| (t.metadata()[key].clone(), t.clone()))
        .collect())
}
