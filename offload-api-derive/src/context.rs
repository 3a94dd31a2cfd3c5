use darling::FromAttributes;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields};

use crate::common::format_error_span;

/// Per-field options for `#[derive(IntoTaskContext)]`
#[derive(Debug, Default, FromAttributes)]
#[darling(attributes(context))]
pub struct FieldOptions {
    /// Route the field to the callables map
    #[darling(default)]
    callable: bool,
    /// Leave the field out of the context
    #[darling(default)]
    skip: bool,
    /// Key to use instead of the field name
    #[darling(default)]
    rename: Option<String>,
}

pub fn expand(input: DeriveInput) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return format_error_span(&input.ident, "IntoTaskContext requires a struct with named fields"),
        },
        _ => return format_error_span(&input.ident, "IntoTaskContext can only be derived for structs"),
    };

    let mut inserts = Vec::new();
    for field in fields {
        let options = match FieldOptions::from_attributes(&field.attrs) {
            Ok(options) => options,
            Err(error) => return error.write_errors(),
        };
        if options.skip && (options.callable || options.rename.is_some()) {
            return format_error_span(field, "`skip` cannot be combined with other context options");
        }
        if options.skip {
            continue;
        }

        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let key = options.rename.unwrap_or_else(|| ident.to_string());

        if options.callable {
            inserts.push(quote! {
                context.insert_callable(#key, ::core::convert::Into::<::offload_api::Callable>::into(self.#ident));
            });
        } else {
            inserts.push(quote! {
                context.insert_data(#key, self.#ident)?;
            });
        }
    }

    quote! {
        impl #impl_generics ::offload_api::IntoTaskContext for #name #ty_generics #where_clause {
            fn into_task_context(self) -> ::core::result::Result<::offload_api::TaskContext, ::offload_api::MarshalError> {
                #[allow(unused_mut)]
                let mut context = ::offload_api::TaskContext::new();
                #(#inserts)*
                ::core::result::Result::Ok(context)
            }
        }
    }
}
