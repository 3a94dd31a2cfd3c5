// Helpers shared by the derive implementations

/// Builds a compile error pointing at `item`.
pub fn format_error_span<T: quote::ToTokens>(item: &T, message: &str) -> proc_macro2::TokenStream {
    syn::Error::new_spanned(item, message).to_compile_error()
}
