use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod common;
mod context;

/// Derives `IntoTaskContext` for a struct with named fields.
///
/// Every field becomes one context entry keyed by its name. Plain fields are
/// serialized into the data map, so their types must implement
/// `serde::Serialize`; fields marked `callable` go to the callables map and
/// must convert into `offload_api::Callable`.
///
/// # Field attributes
///
/// - `#[context(callable)]`: the field is a function, proxied to the worker
/// - `#[context(rename = "key")]`: use `key` instead of the field name
/// - `#[context(skip)]`: leave the field out
///
/// # Example
///
/// ```rust,ignore
/// use offload_api::{Callable, IntoTaskContext};
///
/// #[derive(IntoTaskContext)]
/// struct LoaderContext {
///     resource_path: String,
///     #[context(rename = "sourceMap")]
///     source_map: bool,
///     #[context(callable)]
///     emit_warning: Callable,
///     #[context(skip)]
///     cache_hits: u64,
/// }
///
/// let context = LoaderContext {
///     resource_path: "/src/main.js".to_string(),
///     source_map: true,
///     emit_warning: Callable::from_fn(|_| Ok(offload_api::Value::Null)),
///     cache_hits: 0,
/// }
/// .into_task_context()
/// .unwrap();
///
/// assert!(context.data().contains_key("sourceMap"));
/// assert!(context.callables().contains_key("emit_warning"));
/// assert!(!context.data().contains_key("cache_hits"));
/// ```
///
/// Generic parameters are not given extra bounds; add `T: Serialize` to the
/// struct's where clause for generic data fields.
#[proc_macro_derive(IntoTaskContext, attributes(context))]
pub fn derive_into_task_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    context::expand(input).into()
}
