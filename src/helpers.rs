use std::any::{type_name, Any};
use std::sync::Arc;

use crate::contract::Contract;
use crate::descriptor::Instance;
use crate::error::{CompositionError, Result};

/// Render names as `'a'`, `'a' and 'b'` or `'a', 'b' and 'c'`
pub(crate) fn readable_quoted_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = items
        .into_iter()
        .map(|s| format!("'{}'", s.as_ref()))
        .collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Recover the concrete type of an activated instance
pub(crate) fn downcast<T: Any + Send + Sync>(instance: Instance, contract: &Contract) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| CompositionError::TypeMismatch {
            contract: contract.to_string(),
            expected: type_name::<T>(),
        })
}
