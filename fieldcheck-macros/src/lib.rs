//! Derive macro for fieldcheck
//!
//! `#[derive(Inspect)]` implements `fieldcheck::Inspect` and
//! `fieldcheck::Record` for a struct with named fields, recording each
//! field's annotations in a static table.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    ext::IdentExt, parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields,
    GenericParam, LitStr,
};

/// Derive `Inspect` and `Record`
///
/// # Usage
///
/// ```ignore
/// #[derive(Inspect)]
/// #[inspect(hooks(validate_with))]
/// pub struct Order {
///     #[inspect(tag = r#"json:"id" check:"len(self) == 12""#)]
///     pub id: String,
///
///     /// Members of `Audit` are validated as members of `Order`
///     #[inspect(embed)]
///     pub audit: Audit,
///
///     /// Not visible to the validator
///     #[inspect(skip)]
///     pub scratch: Vec<u8>,
/// }
/// ```
///
/// Container attributes:
/// - `hooks(validate, validate_with, validate_in_context)`: the hook traits
///   the type implements
///
/// Field attributes:
/// - `tag = "..."`: annotation string, in Go struct tag syntax
/// - `embed`: treat the field's members as members of this struct
/// - `skip`: leave the field out entirely
#[proc_macro_derive(Inspect, attributes(inspect))]
pub fn derive_inspect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// A field that takes part in validation
struct InspectedField {
    member: syn::Ident,
    name: String,
    tag: String,
    embedded: bool,
}

/// Hook traits named in `#[inspect(hooks(...))]`
#[derive(Default)]
struct Hooks {
    validate: bool,
    validate_with: bool,
    validate_in_context: bool,
}

fn expand(mut input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Inspect can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Inspect can only be derived for structs",
            ))
        }
    };

    let hooks = parse_hooks(&input.attrs)?;
    let mut fields = Vec::new();
    for field in &named {
        if let Some(inspected) = parse_field(field)? {
            fields.push(inspected);
        }
    }

    for param in &input.generics.params {
        if let GenericParam::Lifetime(lifetime) = param {
            return Err(syn::Error::new_spanned(
                lifetime,
                "Inspect cannot be derived for structs with lifetime parameters",
            ));
        }
    }
    let type_params: Vec<syn::Ident> = input
        .generics
        .type_params()
        .map(|param| param.ident.clone())
        .collect();
    let where_clause = input.generics.make_where_clause();
    for ident in &type_params {
        where_clause
            .predicates
            .push(parse_quote!(#ident: ::fieldcheck::Inspect + 'static));
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let members: Vec<_> = fields.iter().map(|f| &f.member).collect();
    let names: Vec<_> = fields.iter().map(|f| &f.name).collect();
    let tags: Vec<_> = fields.iter().map(|f| &f.tag).collect();
    let embedded: Vec<_> = fields.iter().map(|f| f.embedded).collect();
    let indices: Vec<usize> = (0..fields.len()).collect();
    let count = fields.len();

    let hook = |enabled: bool, path: proc_macro2::TokenStream| {
        if enabled {
            quote! { ::std::option::Option::Some(self as &dyn #path) }
        } else {
            quote! { ::std::option::Option::None }
        }
    };
    let v1 = hook(hooks.validate, quote!(::fieldcheck::Validate));
    let v2 = hook(hooks.validate_with, quote!(::fieldcheck::ValidateWith));
    let v3 = hook(hooks.validate_in_context, quote!(::fieldcheck::ValidateInContext));

    Ok(quote! {
        impl #impl_generics ::fieldcheck::Inspect for #name #ty_generics #where_clause {
            fn shape(&self) -> ::fieldcheck::Shape<'_> {
                ::fieldcheck::Shape::Record(self)
            }

            fn to_value(&self) -> ::fieldcheck::Value {
                let entries: [(::std::string::String, ::fieldcheck::Value); #count] = [
                    #((
                        ::std::string::String::from(#names),
                        ::fieldcheck::Inspect::to_value(&self.#members),
                    )),*
                ];
                ::fieldcheck::map_value(entries)
            }

            fn hook(&self) -> ::fieldcheck::Hook<'_> {
                ::fieldcheck::Hook::most_capable(#v1, #v2, #v3)
            }
        }

        impl #impl_generics ::fieldcheck::Record for #name #ty_generics #where_clause {
            fn record_type(&self) -> ::fieldcheck::RecordType {
                ::fieldcheck::RecordType::of::<Self>()
            }

            fn fields(&self) -> &'static [::fieldcheck::FieldInfo] {
                const FIELDS: &[::fieldcheck::FieldInfo] = &[
                    #(::fieldcheck::FieldInfo {
                        ident: #names,
                        annotations: #tags,
                        embedded: #embedded,
                    }),*
                ];
                FIELDS
            }

            fn field(&self, index: usize) -> ::std::option::Option<&dyn ::fieldcheck::Inspect> {
                match index {
                    #(#indices => ::std::option::Option::Some(&self.#members),)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    })
}

fn parse_hooks(attrs: &[Attribute]) -> syn::Result<Hooks> {
    let mut hooks = Hooks::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("inspect")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("hooks") {
                return Err(meta.error("expected `hooks(...)`"));
            }
            meta.parse_nested_meta(|hook| {
                if hook.path.is_ident("validate") {
                    hooks.validate = true;
                } else if hook.path.is_ident("validate_with") {
                    hooks.validate_with = true;
                } else if hook.path.is_ident("validate_in_context") {
                    hooks.validate_in_context = true;
                } else {
                    return Err(hook.error(
                        "unknown hook, expected `validate`, `validate_with` or `validate_in_context`",
                    ));
                }
                Ok(())
            })
        })?;
    }
    Ok(hooks)
}

fn parse_field(field: &syn::Field) -> syn::Result<Option<InspectedField>> {
    let Some(member) = field.ident.clone() else {
        return Err(syn::Error::new_spanned(field, "expected a named field"));
    };

    let mut tag = String::new();
    let mut embedded = false;
    let mut skip = false;
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("inspect")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let value: LitStr = meta.value()?.parse()?;
                tag = value.value();
            } else if meta.path.is_ident("embed") {
                embedded = true;
            } else if meta.path.is_ident("skip") {
                skip = true;
            } else {
                return Err(meta.error("unknown field attribute, expected `tag`, `embed` or `skip`"));
            }
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }
    Ok(Some(InspectedField {
        name: member.unraw().to_string(),
        member,
        tag,
        embedded,
    }))
}
