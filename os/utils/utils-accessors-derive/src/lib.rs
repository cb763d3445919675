//! # Accessor Derive
//!
//! This crate provides a derive macro for generating setters and getters for
//! structs.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Data, DeriveInput, Fields, GenericArgument, LitBool, PathArguments, Type, parse_macro_input,
    spanned::Spanned,
};

/// Derive to generate `.set_<field>(&mut self, value: Ty) -> &mut Self` and
/// `const .with_<field>(mut self, value: Ty) -> Self` for each **named** field.
///
/// - Skipping a field: `#[setters(skip)]`
/// - Taking the inner value of an `Option<T>` field: `#[setters(strip_option)]`.
///   The setters then accept `T` and store `Some(value)`.
///
/// # Example
///
/// ```
/// use utils_accessors_derive::Setters;
///
/// #[derive(Setters)]
/// struct Foo<T> where T: Default {
///     a: u32,
///     #[setters(strip_option)]
///     name: Option<&'static str>,
///     #[setters(skip)]
///     _phantom: T,
/// }
///
/// let mut f = Foo { a: 1, name: None, _phantom: u8::default() };
/// f.set_a(10).set_a(11);
/// let f2 = f.with_a(42).with_name("stack");
/// assert_eq!(f2.a, 42);
/// assert_eq!(f2.name, Some("stack"));
/// ```
#[proc_macro_derive(Setters, attributes(setters))]
pub fn derive_generate_setters(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let fields = match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(n) => n.named,
            Fields::Unnamed(u) => {
                return syn::Error::new(u.span(), "Setters only supports named fields")
                    .to_compile_error()
                    .into();
            }
            Fields::Unit => {
                return syn::Error::new(
                    ident.span(),
                    "GenerateSetters does not apply to unit structs",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                ident.span(),
                "GenerateSetters can only be derived for structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut methods = Vec::new();

    for field in fields {
        let Some(fname) = &field.ident else { continue };
        let options = match FieldOptions::parse(&field.attrs) {
            Ok(options) => options,
            Err(e) => return e.to_compile_error().into(),
        };
        if options.skip {
            continue;
        }

        let set_name = format_ident!("set_{}", fname);
        let with_name = format_ident!("with_{}", fname);

        let (ty, value) = if options.strip_option {
            let Some(inner) = option_inner(&field.ty) else {
                return syn::Error::new(field.ty.span(), "strip_option requires an Option<T> field")
                    .to_compile_error()
                    .into();
            };
            (inner, quote! { ::core::option::Option::Some(value) })
        } else {
            (&field.ty, quote! { value })
        };

        methods.push(quote! {
            #[inline]
            pub fn #set_name(&mut self, value: #ty) -> &mut Self {
                self.#fname = #value;
                self
            }

            #[inline]
            #[must_use]
            pub const fn #with_name(mut self, value: #ty) -> Self {
                self.#fname = #value;
                self
            }
        });
    }

    let expanded = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    strip_option: bool,
}

impl FieldOptions {
    /// Reads `#[setters(skip)]`, `#[setters(skip = true)]` and `#[setters(strip_option)]`.
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in attrs {
            if !attr.path().is_ident("setters") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    options.skip = if meta.input.is_empty() {
                        true
                    } else {
                        meta.value()?.parse::<LitBool>()?.value
                    };
                    Ok(())
                } else if meta.path.is_ident("strip_option") {
                    options.strip_option = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown setters option"))
                }
            })?;
        }
        Ok(options)
    }
}

/// `T` of a field typed `Option<T>` (also `core::option::Option<T>`).
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let last = path.path.segments.last()?;
    if last.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
