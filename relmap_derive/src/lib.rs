use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Derives `relmap::mapping::Entity` and `relmap::mapping::Persistent`.
///
/// Struct attribute: `#[entity(table = "...")]`.
///
/// Field attribute: `#[column(...)]` with `id`, `version`, `read_only`,
/// `insert_only`, `name = "..."`, `embedded = "prefix"`, `id_column = "..."`,
/// `key_column = "..."` and `sequence = "..."`.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityOptions {
    table: Option<String>,
}

#[derive(Default)]
struct ColumnOptions {
    id: bool,
    version: bool,
    read_only: bool,
    insert_only: bool,
    name: Option<String>,
    embedded: Option<String>,
    id_column: Option<String>,
    key_column: Option<String>,
    sequence: Option<String>,
}

struct EntityField {
    ident: Ident,
    ty: Type,
    options: ColumnOptions,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity does not support generic structs",
        ));
    }

    let entity_options = parse_entity_options(&input.attrs)?;

    let Data::Struct(data_struct) = input.data else {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity can only be derived for structs",
        ));
    };
    let Fields::Named(named_fields) = data_struct.fields else {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let options = parse_column_options(&field.attrs)?;
        fields.push(EntityField {
            ident,
            ty: field.ty,
            options,
        });
    }

    validate_fields(&struct_name, &fields)?;

    let type_name = struct_name.to_string();
    let table = entity_options
        .table
        .map(|table| quote!(.table(#table)))
        .unwrap_or_default();

    let properties = fields.iter().map(|field| {
        let name = property_name(&field.ident);
        let ty = &field.ty;
        let options = &field.options;
        let mut modifiers = Vec::new();
        if options.id {
            modifiers.push(quote!(.id()));
        }
        if options.version {
            modifiers.push(quote!(.version()));
        }
        if options.read_only {
            modifiers.push(quote!(.read_only()));
        }
        if options.insert_only {
            modifiers.push(quote!(.insert_only()));
        }
        if let Some(column) = &options.name {
            modifiers.push(quote!(.column(#column)));
        }
        if let Some(prefix) = &options.embedded {
            modifiers.push(quote!(.embedded(#prefix)));
        }
        if let Some(column) = &options.id_column {
            modifiers.push(quote!(.id_column(#column)));
        }
        if let Some(column) = &options.key_column {
            modifiers.push(quote!(.key_column(#column)));
        }
        if let Some(sequence) = &options.sequence {
            modifiers.push(quote!(.sequence(#sequence)));
        }
        quote! {
            .property(
                ::relmap::mapping::PropertyDescriptor::new(
                    #name,
                    <#ty as ::relmap::mapping::Persistent>::type_info(),
                )
                #(#modifiers)*
            )
        }
    });

    let to_record_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let name = property_name(ident);
        quote! {
            .with(#name, ::relmap::mapping::Persistent::to_property(&self.#ident))
        }
    });

    let from_record_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = property_name(ident);
        quote! {
            #ident: <#ty as ::relmap::mapping::Persistent>::from_property(record.take(#name))?
        }
    });

    Ok(quote! {
        impl ::relmap::mapping::Entity for #struct_name {
            fn descriptor() -> ::relmap::mapping::EntityDescriptor {
                ::relmap::mapping::EntityDescriptor::new(#type_name)
                    #table
                    #(#properties)*
            }

            fn to_record(&self) -> ::relmap::mapping::Record {
                ::relmap::mapping::Record::new(#type_name)
                    #(#to_record_fields)*
            }

            fn from_record(
                mut record: ::relmap::mapping::Record,
            ) -> ::relmap::Result<Self> {
                if record.type_name() != #type_name && !record.type_name().is_empty() {
                    return Err(::relmap::DbError::TypeMismatch(format!(
                        "Expected a {} record, got {}",
                        #type_name,
                        record.type_name()
                    )));
                }
                Ok(Self {
                    #(#from_record_fields),*
                })
            }
        }

        impl ::relmap::mapping::Persistent for #struct_name {
            fn type_info() -> ::relmap::mapping::TypeInfo {
                ::relmap::mapping::TypeInfo::entity(
                    <#struct_name as ::relmap::mapping::Entity>::descriptor,
                )
            }

            fn to_property(&self) -> ::relmap::mapping::PropertyValue {
                ::relmap::mapping::PropertyValue::Entity(
                    ::relmap::mapping::Entity::to_record(self),
                )
            }

            fn from_property(
                value: ::relmap::mapping::PropertyValue,
            ) -> ::relmap::Result<Self> {
                <#struct_name as ::relmap::mapping::Entity>::from_record(value.into_record()?)
            }
        }
    })
}

fn property_name(ident: &Ident) -> String {
    ident.to_string().trim_start_matches("r#").to_string()
}

fn validate_fields(struct_name: &Ident, fields: &[EntityField]) -> syn::Result<()> {
    let ids: Vec<_> = fields.iter().filter(|f| f.options.id).collect();
    if ids.len() > 1 {
        return Err(syn::Error::new(
            ids[1].ident.span(),
            format!("{} declares more than one #[column(id)] field", struct_name),
        ));
    }
    let versions: Vec<_> = fields.iter().filter(|f| f.options.version).collect();
    if versions.len() > 1 {
        return Err(syn::Error::new(
            versions[1].ident.span(),
            format!("{} declares more than one #[column(version)] field", struct_name),
        ));
    }
    for field in fields {
        let options = &field.options;
        if options.id && options.version {
            return Err(syn::Error::new(
                field.ident.span(),
                "A field cannot be both #[column(id)] and #[column(version)]",
            ));
        }
        if options.embedded.is_some() && (options.id || options.version || options.name.is_some()) {
            return Err(syn::Error::new(
                field.ident.span(),
                "#[column(embedded = ...)] cannot be combined with id, version or name",
            ));
        }
        if options.sequence.is_some() && !options.id {
            return Err(syn::Error::new(
                field.ident.span(),
                "#[column(sequence = ...)] is only allowed on the id field",
            ));
        }
    }
    Ok(())
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.table = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported entity attribute. Supported: table = \"...\""))
        })?;
    }

    Ok(options)
}

fn parse_column_options(attrs: &[syn::Attribute]) -> syn::Result<ColumnOptions> {
    let mut options = ColumnOptions::default();
    let mut seen = false;

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        if seen {
            return Err(syn::Error::new(
                attr.span(),
                "Duplicate #[column(...)] attribute on field",
            ));
        }
        seen = true;

        attr.parse_nested_meta(|meta| {
            let flag = if meta.path.is_ident("id") {
                Some(&mut options.id)
            } else if meta.path.is_ident("version") {
                Some(&mut options.version)
            } else if meta.path.is_ident("read_only") {
                Some(&mut options.read_only)
            } else if meta.path.is_ident("insert_only") {
                Some(&mut options.insert_only)
            } else {
                None
            };
            if let Some(flag) = flag {
                *flag = true;
                return Ok(());
            }

            let text = if meta.path.is_ident("name") {
                Some(&mut options.name)
            } else if meta.path.is_ident("embedded") {
                Some(&mut options.embedded)
            } else if meta.path.is_ident("id_column") {
                Some(&mut options.id_column)
            } else if meta.path.is_ident("key_column") {
                Some(&mut options.key_column)
            } else if meta.path.is_ident("sequence") {
                Some(&mut options.sequence)
            } else {
                None
            };
            if let Some(slot) = text {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                *slot = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[column(...)] option. Supported: id, version, read_only, insert_only, \
                 name = \"...\", embedded = \"...\", id_column = \"...\", key_column = \"...\", \
                 sequence = \"...\"",
            ))
        })?;
    }

    Ok(options)
}
