use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::contract::{Contract, ContractType, Metadata, MetadataValue, SHARING_BOUNDARY_NAMES};
use crate::descriptor::{
    CompositeActivator, DependencyRequest, ExportDescriptor, ExportDescriptorPromise, ExportTarget, Instance,
};
use crate::error::Result;
use crate::helpers::downcast;
use crate::lifetime::LifetimeContext;
use crate::operation::CompositionOperation;
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};

/// Instance created by an [ExportFactory], with the context that owns it
pub struct Export {
    pub value: Instance,
    pub lifetime: LifetimeContext,
}

impl Export {
    pub fn get<T: std::any::Any + Send + Sync>(&self, contract: &Contract) -> Result<Arc<T>> {
        downcast(self.value.clone(), contract)
    }

    /// Release whatever was created for this export
    pub fn dispose(self) {
        self.lifetime.dispose();
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export").field("lifetime", &self.lifetime).finish()
    }
}

/// Callable producing a new instance of one export on each call.
///
/// Each call opens a fresh child context entering the factory's boundaries, so parts
/// shared within those boundaries are created anew.
pub struct ExportFactory {
    context: LifetimeContext,
    target: ExportTarget,
    boundaries: Vec<String>,
    descriptor: OnceCell<Arc<ExportDescriptor>>,
}

impl ExportFactory {
    pub fn target(&self) -> &Contract {
        &self.target.contract
    }

    /// Name of the part or provider behind the target export
    pub fn origin(&self) -> &str {
        &self.target.origin
    }

    pub fn sharing_boundaries(&self) -> &[String] {
        &self.boundaries
    }

    pub fn create(&self) -> Result<Export> {
        let descriptor = self
            .descriptor
            .get_or_try_init(|| self.target.descriptor(self.context.registry()))?
            .clone();
        let lifetime = self.context.begin_scope(&self.boundaries);
        match CompositionOperation::run(&lifetime, descriptor.activator()) {
            Ok(value) => Ok(Export { value, lifetime }),
            Err(err) => {
                lifetime.dispose();
                Err(err)
            }
        }
    }

    /// Static metadata of the target export
    pub fn metadata(&self) -> &Metadata {
        &self.target.metadata
    }
}

impl fmt::Debug for ExportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportFactory")
            .field("target", &self.target.contract)
            .field("origin", &self.target.origin)
            .field("boundaries", &self.boundaries)
            .finish()
    }
}

/// Claims `Factory<T>` contracts, one factory per export of `T`, honouring an optional
/// `SharingBoundaryNames` constraint
pub struct ExportFactoryExportDescriptorProvider;

impl ExportDescriptorProvider for ExportFactoryExportDescriptorProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        accessor: &mut dyn DependencyAccessor,
    ) -> Result<Vec<ExportDescriptorPromise>> {
        let ContractType::Factory(inner) = contract.contract_type() else {
            return Ok(Vec::new());
        };

        let (boundaries, unwrapped) = match contract.try_unwrap_constraint(SHARING_BOUNDARY_NAMES) {
            Some((names, unwrapped)) => (boundary_names(&names), unwrapped),
            None => (Vec::new(), contract.clone()),
        };
        let targets = accessor.exports_of(&unwrapped.change_type(inner.as_ref().clone()))?;

        Ok(targets
            .into_iter()
            .map(|target| {
                let (origin, metadata) = (target.origin.clone(), target.metadata.clone());
                let dependency = DependencyRequest::many("product", target.contract.clone()).non_prerequisite();
                let boundaries = boundaries.clone();
                ExportDescriptorPromise::new(
                    contract.clone(),
                    &origin,
                    false,
                    move || Ok(vec![dependency]),
                    move |_| {
                        let activator: CompositeActivator =
                            Arc::new(move |context: &LifetimeContext, _: &CompositionOperation| {
                                Ok(Arc::new(ExportFactory {
                                    context: context.clone(),
                                    target: target.clone(),
                                    boundaries: boundaries.clone(),
                                    descriptor: OnceCell::new(),
                                }) as Instance)
                            });
                        Ok(activator)
                    },
                )
                .with_metadata(metadata)
            })
            .collect())
    }
}

fn boundary_names(value: &MetadataValue) -> Vec<String> {
    match value {
        MetadataValue::List(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        MetadataValue::Str(name) => vec![name.clone()],
        _ => Vec::new(),
    }
}
