use thiserror::Error;

/// Result type alias for composition operations
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Errors triggered while resolving contracts or activating exports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Cardinality mismatch: {found} exports found for contract '{contract}'{}", site_suffix(.site))]
    CardinalityMismatch {
        contract: String,
        found: usize,
        site: Option<String>,
    },
    #[error("Cyclic dependency: {chain}")]
    CyclicDependency { chain: String },
    #[error("No importing constructor was found on part '{part}'")]
    NoImportingConstructor { part: String },
    #[error("Multiple importing constructors were found on part '{part}'")]
    AmbiguousConstructor { part: String },
    #[error("The metadata '{key}' cannot be used for ordering because it is missing from exports on part(s) {origins}")]
    MissingOrderingMetadata { key: String, origins: String },
    #[error("The metadata '{key}' cannot be used as a key because it is missing from exports on part(s) {origins}")]
    MissingKeyMetadata { key: String, origins: String },
    #[error("Duplicate key {value} for metadata '{key}' on parts '{first}' and '{second}'")]
    DuplicateKey {
        key: String,
        value: String,
        first: String,
        second: String,
    },
    #[error("Import '{parameter}' of part '{part}' allows a default but its constructor argument cannot be absent")]
    NonOptionalParameter { part: String, parameter: String },
    #[error("Part '{part}' expects {expected} type argument(s) but {supplied} were supplied")]
    GenericArityMismatch {
        part: String,
        expected: usize,
        supplied: usize,
    },
    #[error("The sharing boundary '{0}' could not be found")]
    SharingBoundaryNotFound(String),
    #[error("Export for contract '{contract}' is not of type {expected}")]
    TypeMismatch {
        contract: String,
        expected: &'static str,
    },
    #[error("Shared part '{origin}' was requested again while it was being activated")]
    ReentrantActivation { origin: String },
    #[error("The lifetime context has been disposed")]
    ContextDisposed,
    #[error("Activation failed: {0}")]
    Activation(String),
}

fn site_suffix(site: &Option<String>) -> String {
    match site {
        Some(site) => format!(" (import '{}')", site),
        None => String::new(),
    }
}

impl CompositionError {
    pub(crate) fn cardinality(contract: impl ToString, found: usize) -> Self {
        CompositionError::CardinalityMismatch {
            contract: contract.to_string(),
            found,
            site: None,
        }
    }

    pub(crate) fn at_site(self, import_site: &str) -> Self {
        match self {
            CompositionError::CardinalityMismatch {
                contract,
                found,
                site: None,
            } => CompositionError::CardinalityMismatch {
                contract,
                found,
                site: Some(import_site.to_string()),
            },
            other => other,
        }
    }
}
