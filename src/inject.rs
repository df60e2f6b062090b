use std::any::{type_name, Any};
use std::sync::Arc;

use crate::descriptor::Instance;
use crate::error::{CompositionError, Result};
use crate::parts::ParameterImport;

/// A constructor argument type that can be built from a resolved import.
///
/// `Arc<T>` requires a value; `Option<Arc<T>>` receives `None` when an allow-default
/// import found no export. Allow-default imports must bind to an argument accepting
/// absence.
pub trait Injected: Sized {
    /// Whether the argument accepts a missing value
    const OPTIONAL: bool = false;

    fn from_import(value: Option<Instance>, import: Option<&ParameterImport>) -> Result<Self>;
}

fn describe(import: Option<&ParameterImport>) -> String {
    import
        .map(|p| format!("{} ({})", p.contract, p.name))
        .unwrap_or_default()
}

fn mismatch<T>(import: Option<&ParameterImport>) -> CompositionError {
    CompositionError::TypeMismatch {
        contract: describe(import),
        expected: type_name::<T>(),
    }
}

impl<T: Any + Send + Sync> Injected for Arc<T> {
    fn from_import(value: Option<Instance>, import: Option<&ParameterImport>) -> Result<Self> {
        match value {
            Some(instance) => instance.downcast::<T>().map_err(|_| mismatch::<T>(import)),
            None => Err(CompositionError::Activation(format!(
                "no value was supplied for required import {}",
                describe(import)
            ))),
        }
    }
}

impl<T: Any + Send + Sync> Injected for Option<Arc<T>> {
    const OPTIONAL: bool = true;

    fn from_import(value: Option<Instance>, import: Option<&ParameterImport>) -> Result<Self> {
        match value {
            Some(instance) => instance
                .downcast::<T>()
                .map(Some)
                .map_err(|_| mismatch::<T>(import)),
            None => Ok(None),
        }
    }
}

/// A function usable as part constructor.
///
/// Implemented for every `Fn` of up to 10 [Injected] arguments, using a tuple to
/// wrap them all in a single type.
pub trait Constructor<Args>: Send + Sync + 'static {
    const ARITY: usize;

    /// For each argument, whether it accepts a missing value
    fn optional_arguments() -> Vec<bool>;

    fn construct(&self, args: Vec<Option<Instance>>, imports: &[ParameterImport]) -> Result<Instance>;
}

macro_rules! one {
    ($param:ident) => {
        1
    };
}

macro_rules! constructor_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Constructor<($($param,)*)> for Func
    where
        Func: Fn($($param),*) -> Ret + Send + Sync + 'static,
        Ret: Any + Send + Sync,
        $($param: Injected,)*
    {
        const ARITY: usize = 0 $(+ one!($param))*;

        fn optional_arguments() -> Vec<bool> {
            vec![$(<$param as Injected>::OPTIONAL),*]
        }

        #[inline]
        #[allow(non_snake_case, unused_mut, unused_variables)]
        fn construct(&self, args: Vec<Option<Instance>>, imports: &[ParameterImport]) -> Result<Instance> {
            let mut args = args.into_iter();
            let mut imports = imports.iter();
            $(let $param = $param::from_import(args.next().flatten(), imports.next())?;)*
            Ok(Arc::new((self)($($param),*)))
        }
    }
});

constructor_tuple! {}
constructor_tuple! { A }
constructor_tuple! { A B }
constructor_tuple! { A B C }
constructor_tuple! { A B C D }
constructor_tuple! { A B C D E }
constructor_tuple! { A B C D E F }
constructor_tuple! { A B C D E F G }
constructor_tuple! { A B C D E F G H }
constructor_tuple! { A B C D E F G H I }
constructor_tuple! { A B C D E F G H I J }
