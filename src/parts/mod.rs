//! Part descriptors: the surface through which parts declare what they need and offer
//!
//! A [PartDescriptor] lists the part's constructors, the contracts it exports, optional
//! property imports and lifecycle hooks. Descriptors are built programmatically, or
//! supplied per type through the [Part] trait; the engine never inspects types itself.
//!
//! ```
//! # use std::sync::Arc;
//! # use trellis::*;
//! struct Clock;
//! struct Greeter { clock: Arc<Clock> }
//!
//! let greeter = PartDescriptor::new("Greeter")
//!     .export(Contract::named("Greeter"))
//!     .constructor(ConstructorDescriptor::importing(
//!         vec![ParameterImport::required("clock", Contract::named("Clock"))],
//!         |clock: Arc<Clock>| Greeter { clock },
//!     ));
//! assert_eq!(greeter.exports().len(), 1);
//! ```

mod discovered;
mod provider;

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::contract::{Contract, ContractType, Metadata, MetadataValue, IS_SHARED, SHARING_BOUNDARY};
use crate::descriptor::Instance;
use crate::error::{CompositionError, Result};
use crate::inject::Constructor;

pub use provider::TypedPartExportDescriptorProvider;

type ConstructorFn = Arc<dyn Fn(Vec<Option<Instance>>, &[ParameterImport]) -> Result<Instance> + Send + Sync>;
type PropertySetter = Arc<dyn Fn(&Instance, Instance) -> Result<()> + Send + Sync>;
type InstanceHook = Arc<dyn Fn(&Instance) -> Result<()> + Send + Sync>;
type ReleaseHook = Arc<dyn Fn(&Instance) + Send + Sync>;
type GenericCloser = Arc<dyn Fn(&[ContractType]) -> Result<PartDescriptor> + Send + Sync>;

/// A part type that describes itself
pub trait Part: Send + Sync + 'static {
    fn descriptor() -> PartDescriptor;
}

/// A constructor parameter and the contract it imports
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterImport {
    pub name: String,
    pub contract: Contract,
    /// Receive no value instead of failing when nothing exports the contract
    pub allow_default: bool,
}

impl ParameterImport {
    pub fn required(name: &str, contract: Contract) -> Self {
        Self {
            name: name.to_string(),
            contract,
            allow_default: false,
        }
    }

    pub fn optional(name: &str, contract: Contract) -> Self {
        Self {
            name: name.to_string(),
            contract,
            allow_default: true,
        }
    }
}

/// A contract offered by a part, with its static metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportDeclaration {
    pub contract: Contract,
    pub metadata: Metadata,
}

impl ExportDeclaration {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One way of constructing a part
#[derive(Clone)]
pub struct ConstructorDescriptor {
    importing: bool,
    public: bool,
    parameters: Vec<ParameterImport>,
    arity: usize,
    accepts_absent: Vec<bool>,
    body: ConstructorFn,
}

impl ConstructorDescriptor {
    /// The constructor designated for composition
    pub fn importing<Args, F: Constructor<Args>>(parameters: Vec<ParameterImport>, f: F) -> Self {
        Self::new(parameters, f).designated()
    }

    /// A public constructor, used for composition only if it takes no argument and no
    /// other constructor is designated
    pub fn new<Args, F: Constructor<Args>>(parameters: Vec<ParameterImport>, f: F) -> Self {
        Self {
            importing: false,
            public: true,
            parameters,
            arity: F::ARITY,
            accepts_absent: F::optional_arguments(),
            body: Arc::new(move |args: Vec<Option<Instance>>, imports: &[ParameterImport]| {
                f.construct(args, imports)
            }),
        }
    }

    /// Public zero-argument constructor using [Default]
    pub fn default_of<T: Default + Any + Send + Sync>() -> Self {
        Self::new(Vec::new(), T::default)
    }

    /// Constructor working directly on the resolved instances, `None` for absent
    /// allow-default imports
    pub fn from_instances<F>(parameters: Vec<ParameterImport>, f: F) -> Self
    where
        F: Fn(Vec<Option<Instance>>) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            importing: false,
            public: true,
            arity: parameters.len(),
            accepts_absent: vec![true; parameters.len()],
            parameters,
            body: Arc::new(move |args: Vec<Option<Instance>>, _: &[ParameterImport]| f(args)),
        }
    }

    pub fn designated(mut self) -> Self {
        self.importing = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn parameters(&self) -> &[ParameterImport] {
        &self.parameters
    }

    pub fn is_importing(&self) -> bool {
        self.importing
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub(crate) fn invoke(&self, args: Vec<Option<Instance>>) -> Result<Instance> {
        (self.body)(args, &self.parameters)
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("importing", &self.importing)
            .field("public", &self.public)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Import applied to an existing instance after construction
#[derive(Clone)]
pub struct PropertyImport {
    pub name: String,
    pub contract: Contract,
    pub allow_default: bool,
    setter: PropertySetter,
}

impl fmt::Debug for PropertyImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyImport")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .field("allow_default", &self.allow_default)
            .finish()
    }
}

#[derive(Clone)]
struct GenericDefinition {
    arity: usize,
    close: GenericCloser,
}

/// Everything the engine needs to know about a part
#[derive(Clone)]
pub struct PartDescriptor {
    name: String,
    constructors: Vec<ConstructorDescriptor>,
    exports: Vec<ExportDeclaration>,
    metadata: Metadata,
    properties: Vec<PropertyImport>,
    on_imports_satisfied: Option<InstanceHook>,
    on_release: Option<ReleaseHook>,
    generic: Option<GenericDefinition>,
}

impl PartDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constructors: Vec::new(),
            exports: Vec::new(),
            metadata: Metadata::new(),
            properties: Vec::new(),
            on_imports_satisfied: None,
            on_release: None,
            generic: None,
        }
    }

    pub fn export(self, contract: Contract) -> Self {
        self.export_declaration(ExportDeclaration::new(contract))
    }

    pub fn export_declaration(mut self, export: ExportDeclaration) -> Self {
        self.exports.push(export);
        self
    }

    /// Add a part-level metadata item
    pub fn metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Share a single instance per container
    pub fn shared(self) -> Self {
        self.metadata(IS_SHARED, true)
    }

    /// Share a single instance per context entering the boundary
    pub fn shared_within(self, boundary: &str) -> Self {
        self.shared().metadata(SHARING_BOUNDARY, boundary)
    }

    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Import a contract into an already constructed instance of `P`
    pub fn property<P, V, F>(mut self, name: &str, contract: Contract, allow_default: bool, setter: F) -> Self
    where
        P: Any + Send + Sync,
        V: Any + Send + Sync,
        F: Fn(&P, Arc<V>) + Send + Sync + 'static,
    {
        let part = self.name.clone();
        let described = contract.to_string();
        let setter: PropertySetter = Arc::new(move |instance: &Instance, value: Instance| {
            let target = instance.downcast_ref::<P>().ok_or_else(|| CompositionError::TypeMismatch {
                contract: part.clone(),
                expected: type_name::<P>(),
            })?;
            let value = value.downcast::<V>().map_err(|_| CompositionError::TypeMismatch {
                contract: described.clone(),
                expected: type_name::<V>(),
            })?;
            setter(target, value);
            Ok(())
        });
        self.properties.push(PropertyImport {
            name: name.to_string(),
            contract,
            allow_default,
            setter,
        });
        self
    }

    /// Notification sent once per instance, after its imports are satisfied
    pub fn on_imports_satisfied<P, F>(mut self, hook: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) + Send + Sync + 'static,
    {
        let part = self.name.clone();
        self.on_imports_satisfied = Some(Arc::new(move |instance: &Instance| {
            let target = instance.downcast_ref::<P>().ok_or_else(|| CompositionError::TypeMismatch {
                contract: part.clone(),
                expected: type_name::<P>(),
            })?;
            hook(target);
            Ok(())
        }));
        self
    }

    /// Hook called once when the context owning an instance is disposed
    pub fn on_release<P, F>(mut self, hook: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.on_release = Some(Arc::new(move |instance: &Instance| {
            if let Some(target) = instance.downcast_ref::<P>() {
                hook(target);
            }
        }));
        self
    }

    /// Declare the part as open generic over `arity` type arguments.
    ///
    /// `close` derives the closed part for concrete arguments; it runs once per distinct
    /// argument list.
    pub fn open_generic<F>(mut self, arity: usize, close: F) -> Self
    where
        F: Fn(&[ContractType]) -> Result<PartDescriptor> + Send + Sync + 'static,
    {
        self.generic = Some(GenericDefinition {
            arity,
            close: Arc::new(close),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exports(&self) -> &[ExportDeclaration] {
        &self.exports
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn properties(&self) -> &[PropertyImport] {
        &self.properties
    }

    pub fn part_metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_shared(&self) -> bool {
        self.metadata
            .get(IS_SHARED)
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false)
    }

    pub fn sharing_boundary(&self) -> Option<&str> {
        self.metadata.get(SHARING_BOUNDARY).and_then(MetadataValue::as_str)
    }

    pub fn generic_arity(&self) -> Option<usize> {
        self.generic.as_ref().map(|g| g.arity)
    }
}

impl fmt::Debug for PartDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartDescriptor")
            .field("name", &self.name)
            .field("exports", &self.exports)
            .field("metadata", &self.metadata)
            .field("constructors", &self.constructors)
            .field("properties", &self.properties)
            .field("generic_arity", &self.generic_arity())
            .finish()
    }
}

/// Describe a part exporting one or more contracts through an importing constructor.
///
/// Each constructor argument is listed as `name: contract` and is a required import.
#[macro_export]
macro_rules! export_part {
    ($name:expr => [$($export:expr),+ $(,)?], $constructor:expr $(, $param:ident : $import:expr)* $(,)?) => {
        $crate::PartDescriptor::new($name)
            $(.export($export))+
            .constructor($crate::ConstructorDescriptor::importing(
                vec![$($crate::ParameterImport::required(stringify!($param), $import)),*],
                $constructor,
            ))
    };
}
