//! `#[derive(Bindable)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input};

enum Role {
    Leaf,
    Nested,
}

struct BindField {
    ident: Ident,
    ty: Type,
    wire_name: String,
    role: Role,
}

fn parse_field(field: &syn::Field) -> syn::Result<Option<BindField>> {
    let Some(ident) = field.ident.clone() else {
        return Err(syn::Error::new_spanned(field, "Bindable fields must be named"));
    };
    let mut wire_name = ident.to_string();
    if let Some(raw) = wire_name.strip_prefix("r#") {
        wire_name = raw.to_string();
    }
    let mut role = Role::Leaf;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("bind") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                wire_name = lit.value();
                Ok(())
            } else if meta.path.is_ident("nested") {
                role = Role::Nested;
                Ok(())
            } else if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown bind attribute, expected `rename`, `nested` or `skip`"))
            }
        })?;
    }

    if skip {
        return Ok(None);
    }
    if wire_name.is_empty() {
        return Err(syn::Error::new_spanned(field, "wire name must not be empty"));
    }
    Ok(Some(BindField {
        ident,
        ty: field.ty.clone(),
        wire_name,
        role,
    }))
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    if input.generics.type_params().next().is_some() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Bindable cannot be derived for generic records",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Bindable can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &data.fields,
            "Bindable requires a struct with named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in &named.named {
        if let Some(parsed) = parse_field(field)? {
            if fields
                .iter()
                .any(|f: &BindField| f.wire_name == parsed.wire_name)
            {
                return Err(syn::Error::new_spanned(
                    field,
                    format!("duplicate wire name `{}`", parsed.wire_name),
                ));
            }
            fields.push(parsed);
        }
    }

    let specs = fields.iter().map(|f| {
        let wire = &f.wire_name;
        let ty = &f.ty;
        let kind = match f.role {
            Role::Leaf => quote! {
                ::core::option::Option::Some(<#ty as ::tether::FieldType>::KIND)
            },
            Role::Nested => quote! { ::core::option::Option::None },
        };
        quote! {
            ::tether::FieldSpec { name: #wire, kind: #kind }
        }
    });

    let bind_arms = fields.iter().map(|f| {
        let wire = &f.wire_name;
        let ident = &f.ident;
        match f.role {
            Role::Leaf => quote! {
                ::core::option::Option::Some(#wire) => ::tether::set_leaf(&mut self.#ident, path.tail(), value),
            },
            Role::Nested => quote! {
                ::core::option::Option::Some(#wire) => ::tether::Bindable::bind_field(&mut self.#ident, path.tail(), value),
            },
        }
    });

    let kind_arms = fields.iter().map(|f| {
        let wire = &f.wire_name;
        let ident = &f.ident;
        let ty = &f.ty;
        match f.role {
            Role::Leaf => quote! {
                #wire => ::tether::leaf_kind::<#ty>(path.tail()),
            },
            Role::Nested => quote! {
                #wire => ::tether::Bindable::field_kind(&self.#ident, path.tail()),
            },
        }
    });

    let encoders = fields.iter().map(|f| {
        let wire = &f.wire_name;
        let ident = &f.ident;
        match f.role {
            Role::Leaf => quote! {
                ::tether::encode_leaf(&self.#ident, ::tether::join_name(prefix, #wire), out);
            },
            Role::Nested => quote! {
                ::tether::Bindable::encode_fields(&self.#ident, &::tether::join_name(prefix, #wire), out);
            },
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::tether::Bindable for #name #ty_generics #where_clause {
            fn fields() -> &'static [::tether::FieldSpec] {
                const FIELDS: &[::tether::FieldSpec] = &[#(#specs),*];
                FIELDS
            }

            #[allow(unused_variables)]
            fn bind_field(
                &mut self,
                path: ::tether::FieldPath<'_>,
                value: ::tether::FieldValue,
            ) -> ::core::result::Result<(), ::tether::FieldError> {
                match path.head() {
                    #(#bind_arms)*
                    _ => ::core::result::Result::Err(
                        ::tether::FieldError::UnknownField(::std::string::ToString::to_string(&path)),
                    ),
                }
            }

            fn field_kind(
                &self,
                path: ::tether::FieldPath<'_>,
            ) -> ::core::option::Option<::tether::FieldKind> {
                match path.head()? {
                    #(#kind_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn encode_fields(
                &self,
                prefix: &str,
                out: &mut ::std::vec::Vec<::tether::FieldItem>,
            ) {
                #(#encoders)*
            }
        }
    })
}

/// Implementation of `#[derive(Bindable)]`.
pub fn derive_bindable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}
