//! Contract identities and export metadata
//!
//! A [Contract] names a capability together with an ordered set of metadata constraints.
//! Two contracts are equal when both the type and every constraint match, so the same
//! capability requested "ordered by `Priority`" and "unordered" are different keys in the
//! export registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata key marking a part as shared
pub const IS_SHARED: &str = "IsShared";

/// Metadata key naming the sharing boundary of a shared part
pub const SHARING_BOUNDARY: &str = "SharingBoundary";

/// Constraint naming the metadata item used to order a many-valued import
pub const ORDER_BY_METADATA: &str = "OrderMetadataName";

/// Constraint naming the metadata item used as key of a keyed import
pub const KEY_BY_METADATA: &str = "KeyMetadataName";

/// Constraint listing the boundaries entered by the scopes an export factory opens
pub const SHARING_BOUNDARY_NAMES: &str = "SharingBoundaryNames";

/// Value stored in export metadata and contract constraints
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Null => write!(f, "null"),
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Str(s) => write!(f, "\"{}\"", s),
            MetadataValue::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<i32> for MetadataValue {
    fn from(i: i32) -> Self {
        MetadataValue::Int(i as i64)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(v: Vec<T>) -> Self {
        MetadataValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Static metadata attached to exports, parts and contracts
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Shape of a requested or provided capability.
///
/// `Named` covers plain capabilities and closed generics (non-empty `args`). The wrapper
/// shapes are claimed by the built-in providers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContractType {
    Named {
        name: Arc<str>,
        args: Vec<ContractType>,
    },
    /// Memoized handle resolving the inner contract on first use
    Deferred(Box<ContractType>),
    /// Every export of the inner contract
    Many(Box<ContractType>),
    /// Every export of the inner contract, keyed by a metadata item
    Keyed(Box<ContractType>),
    /// Callable producing a fresh instance of the inner contract on each call
    Factory(Box<ContractType>),
    /// The lifetime context performing the activation
    Scope,
}

impl ContractType {
    pub fn named(name: &str) -> Self {
        ContractType::Named {
            name: Arc::from(name),
            args: Vec::new(),
        }
    }

    pub fn generic(name: &str, args: Vec<ContractType>) -> Self {
        ContractType::Named {
            name: Arc::from(name),
            args,
        }
    }

    pub fn deferred(self) -> Self {
        ContractType::Deferred(Box::new(self))
    }

    pub fn many(self) -> Self {
        ContractType::Many(Box::new(self))
    }

    pub fn keyed(self) -> Self {
        ContractType::Keyed(Box::new(self))
    }

    pub fn factory(self) -> Self {
        ContractType::Factory(Box::new(self))
    }

    /// Name and type arguments of a named contract type
    pub fn as_named(&self) -> Option<(&str, &[ContractType])> {
        match self {
            ContractType::Named { name, args } => Some((name, args)),
            _ => None,
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractType::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            ContractType::Deferred(inner) => write!(f, "Deferred<{}>", inner),
            ContractType::Many(inner) => write!(f, "Many<{}>", inner),
            ContractType::Keyed(inner) => write!(f, "Keyed<{}>", inner),
            ContractType::Factory(inner) => write!(f, "Factory<{}>", inner),
            ContractType::Scope => write!(f, "Scope"),
        }
    }
}

/// Identity of a requested or provided capability
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Contract {
    ty: ContractType,
    constraints: Metadata,
}

impl Contract {
    pub fn new(ty: ContractType) -> Self {
        Self {
            ty,
            constraints: Metadata::new(),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(ContractType::named(name))
    }

    pub fn generic(name: &str, args: Vec<ContractType>) -> Self {
        Self::new(ContractType::generic(name, args))
    }

    pub fn scope() -> Self {
        Self::new(ContractType::Scope)
    }

    pub fn with_constraint(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.constraints.insert(key.to_string(), value.into());
        self
    }

    /// Request every export of this contract
    pub fn many(self) -> Self {
        Self {
            ty: self.ty.many(),
            constraints: self.constraints,
        }
    }

    /// Request every export of this contract, ordered by the given metadata item
    pub fn ordered_by(self, key: &str) -> Self {
        self.many().with_constraint(ORDER_BY_METADATA, key)
    }

    /// Request every export of this contract, keyed by the given metadata item
    pub fn keyed_by(self, key: &str) -> Self {
        Self {
            ty: self.ty.keyed(),
            constraints: self.constraints,
        }
        .with_constraint(KEY_BY_METADATA, key)
    }

    pub fn deferred(self) -> Self {
        Self {
            ty: self.ty.deferred(),
            constraints: self.constraints,
        }
    }

    pub fn factory(self) -> Self {
        Self {
            ty: self.ty.factory(),
            constraints: self.constraints,
        }
    }

    pub fn contract_type(&self) -> &ContractType {
        &self.ty
    }

    pub fn constraints(&self) -> &Metadata {
        &self.constraints
    }

    /// Same constraints, different type
    pub fn change_type(&self, ty: ContractType) -> Self {
        Self {
            ty,
            constraints: self.constraints.clone(),
        }
    }

    /// Strip a recognized constraint, returning its value and the remaining contract.
    ///
    /// Returns `None` when the constraint is absent.
    pub fn try_unwrap_constraint(&self, key: &str) -> Option<(MetadataValue, Contract)> {
        let value = self.constraints.get(key)?.clone();
        let mut constraints = self.constraints.clone();
        constraints.remove(key);
        Some((
            value,
            Contract {
                ty: self.ty.clone(),
                constraints,
            },
        ))
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if !self.constraints.is_empty() {
            write!(f, " {{ ")?;
            for (i, (k, v)) in self.constraints.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} = {}", k, v)?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}
