use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::contract::Contract;
use crate::descriptor::ExportDescriptorPromise;
use crate::error::{CompositionError, Result};
use crate::parts::discovered::DiscoveredPart;
use crate::parts::{ExportDeclaration, PartDescriptor};
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

#[derive(Clone)]
struct DiscoveredExport {
    part: Arc<DiscoveredPart>,
    declaration: ExportDeclaration,
}

impl DiscoveredExport {
    fn promise(&self, contract: &Contract) -> ExportDescriptorPromise {
        let origin = self.part.name().to_string();
        let is_shared = self.part.descriptor().is_shared();
        let enumerating = self.part.clone();
        let finalizing = self.part.clone();
        let metadata = self.declaration.metadata.clone();

        ExportDescriptorPromise::new(
            contract.clone(),
            &origin,
            is_shared,
            move || enumerating.dependencies(),
            move |dependencies| finalizing.activator(dependencies),
        )
        .with_metadata(metadata)
    }
}

/// Resolves contracts against user-declared parts.
///
/// Open generic parts are indexed by the name of the contracts they export and closed
/// on the first request carrying matching type arguments. Closed parts are kept for the
/// lifetime of the provider.
pub struct TypedPartExportDescriptorProvider {
    exports: RwLock<HashMap<Contract, Vec<DiscoveredExport>>>,
    open_generics: HashMap<Arc<str>, Vec<Arc<DiscoveredPart>>>,
}

impl TypedPartExportDescriptorProvider {
    pub fn new(parts: impl IntoIterator<Item = PartDescriptor>) -> Self {
        let mut exports = HashMap::new();
        let mut open_generics: HashMap<Arc<str>, Vec<Arc<DiscoveredPart>>> = HashMap::new();

        for descriptor in parts {
            let part = DiscoveredPart::new(descriptor);
            if part.descriptor().generic_arity().is_none() {
                register_exports(&mut exports, &part);
                continue;
            }
            for export in part.descriptor().exports() {
                if let Some((name, _)) = export.contract.contract_type().as_named() {
                    let entry = open_generics.entry(Arc::from(name)).or_default();
                    if !entry.iter().any(|p| Arc::ptr_eq(p, &part)) {
                        entry.push(part.clone());
                    }
                }
            }
        }

        Self {
            exports: RwLock::new(exports),
            open_generics,
        }
    }

    fn close_generic_parts(&self, contract: &Contract) -> Result<()> {
        let Some((name, arguments)) = contract.contract_type().as_named() else {
            return Ok(());
        };
        if arguments.is_empty() {
            return Ok(());
        }
        let Some(candidates) = self.open_generics.get(name) else {
            return Ok(());
        };

        let matching: Vec<&Arc<DiscoveredPart>> = candidates
            .iter()
            .filter(|p| p.descriptor().generic_arity() == Some(arguments.len()))
            .collect();
        if matching.is_empty() {
            if let Some(first) = candidates.first() {
                return Err(CompositionError::GenericArityMismatch {
                    part: first.name().to_string(),
                    expected: first.descriptor().generic_arity().unwrap_or_default(),
                    supplied: arguments.len(),
                });
            }
        }

        for part in matching {
            if let Some(closed) = part.try_close(arguments)? {
                debug!(part = part.name(), closed = closed.name(), "closed generic part");
                register_exports(&mut self.exports.write(), &closed);
            }
        }
        Ok(())
    }
}

fn register_exports(exports: &mut HashMap<Contract, Vec<DiscoveredExport>>, part: &Arc<DiscoveredPart>) {
    for declaration in part.descriptor().exports() {
        exports
            .entry(declaration.contract.clone())
            .or_default()
            .push(DiscoveredExport {
                part: part.clone(),
                declaration: declaration.clone(),
            });
    }
}

impl ExportDescriptorProvider for TypedPartExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        self.close_generic_parts(contract)?;
        let exports = self.exports.read();
        Ok(exports
            .get(contract)
            .map(|found| found.iter().map(|e| e.promise(contract)).collect())
            .unwrap_or_default())
    }
}
