//! Derive macro for Strata ECS components.
//!
//! `#[derive(Component)]` implements `strata_ecs::Component` with a name
//! built from the module path and type name, and rejects types that cannot
//! be stored as plain bytes.
//!
//! ```ignore
//! #[derive(Component, Clone, Copy)]
//! struct Position { x: f32, y: f32 }
//!
//! // Keep the key stable across module moves.
//! #[derive(Component, Clone, Copy)]
//! #[component(name = "physics::Velocity")]
//! struct Velocity { x: f32, y: f32 }
//! ```
//!
//! # Forbidden Types
//!
//! Components are copied bitwise and never dropped, so anything owning heap
//! memory, a lock, or a handle is rejected with a targeted message:
//!
//! - `Vec<T>`, `VecDeque<T>`, `HashMap<K, V>`, `String` and friends
//! - `Box<T>` / `Rc<T>` / `Arc<T>`
//! - `Mutex<T>` / `RwLock<T>` / `Cell<T>` / `RefCell<T>`
//! - references, raw pointers, trait objects
//!
//! Generic types are rejected too: every instantiation would share one name
//! and therefore one storage.

use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr, Path, PathArguments, Type,
    spanned::Spanned,
};

/// Forbidden type patterns. Each entry is (type_name, advice).
const FORBIDDEN_TYPES: &[(&str, &str)] = &[
    (
        "Vec",
        "Vec<T> owns heap memory and cannot be copied bitwise. Alternatives:\n\
         - Create one entity per item, each holding the item as a component\n\
         - Use a fixed-size array when the length is bounded: [T; N]",
    ),
    (
        "VecDeque",
        "VecDeque<T> owns heap memory and cannot be copied bitwise.\n\
         - Create one entity per item with a sequence field and order_by it",
    ),
    (
        "HashMap",
        "HashMap<K, V> owns heap memory and cannot be copied bitwise.\n\
         - Create one entity per entry holding the key and value as components",
    ),
    (
        "HashSet",
        "HashSet<T> owns heap memory and cannot be copied bitwise.\n\
         - Use a tag component per member instead",
    ),
    (
        "BTreeMap",
        "BTreeMap<K, V> owns heap memory and cannot be copied bitwise.\n\
         - Create one entity per entry and order_by the key",
    ),
    (
        "BTreeSet",
        "BTreeSet<T> owns heap memory and cannot be copied bitwise.",
    ),
    (
        "String",
        "String owns heap memory and cannot be copied bitwise. Alternatives:\n\
         - Use a fixed-size byte array: [u8; 32]\n\
         - Use an interned id: NameId(u64)",
    ),
    (
        "Box",
        "Box<T> owns heap memory and cannot be copied bitwise.\n\
         - Store T inline, or split it into several smaller components",
    ),
    (
        "Rc",
        "Rc<T> is a counted handle; bitwise copies would corrupt the count.\n\
         - Store the shared data on its own entity and keep its Entity id",
    ),
    (
        "Arc",
        "Arc<T> is a counted handle; bitwise copies would corrupt the count.\n\
         - Store the shared data on its own entity and keep its Entity id",
    ),
    (
        "Mutex",
        "Mutex<T> is not allowed in components. Systems get exclusive access to\n\
         written components already; write the value through a pack instead.",
    ),
    (
        "RwLock",
        "RwLock<T> is not allowed in components. Bind the component with\n\
         read or write access in the system's query instead.",
    ),
    (
        "RefCell",
        "RefCell<T> is not allowed in components. Write the value through a pack\n\
         or set_component instead.",
    ),
    (
        "Cell",
        "Cell<T> is not allowed in components. Write the value through a pack\n\
         or set_component instead.",
    ),
    (
        "Sender",
        "Channel Sender is not allowed in components. Record changes in the\n\
         system's command buffer instead.",
    ),
    (
        "Receiver",
        "Channel Receiver is not allowed in components. Use an on_add query to\n\
         react to new data instead.",
    ),
    (
        "LinkedList",
        "LinkedList<T> owns heap memory and cannot be copied bitwise.",
    ),
    (
        "BinaryHeap",
        "BinaryHeap<T> owns heap memory and cannot be copied bitwise.\n\
         - Create one entity per item and order_by a priority field",
    ),
];

/// Read `#[component(name = "...")]`.
fn component_name(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut name = None;
    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unknown component attribute; expected `name = \"...\"`"))
            }
        })?;
    }
    Ok(name)
}

/// Derive macro for ECS components.
///
/// The type must also implement `Copy`. Its name defaults to
/// `module_path!()::TypeName`; override it with `#[component(name = "...")]`.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    TokenStream::from(expand(&input))
}

/// Either the `Component` impl or every rejection found, as `compile_error!`s.
fn expand(input: &DeriveInput) -> proc_macro2::TokenStream {
    let ident = &input.ident;

    let mut errors = Vec::new();

    if !input.generics.params.is_empty() {
        errors.push(quote_spanned! {
            input.generics.span() =>
            compile_error!("Generic types cannot derive Component: every instantiation would share one name.\n\
                           Define a concrete type per instantiation instead.");
        });
    }

    match &input.data {
        Data::Struct(data) => check_fields(&data.fields, &mut errors),
        Data::Enum(data) => {
            if data.variants.is_empty() {
                errors.push(quote_spanned! {
                    input.span() =>
                    compile_error!("Empty enums cannot derive Component: they have no value to store.");
                });
            }
            for variant in &data.variants {
                check_fields(&variant.fields, &mut errors);
            }
        }
        Data::Union(_) => {
            errors.push(quote_spanned! {
                input.span() =>
                compile_error!("Unions cannot derive Component. Use a struct or enum instead.");
            });
        }
    }

    let name = match component_name(&input.attrs) {
        Ok(Some(name)) => quote! { #name },
        Ok(None) => quote! { ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#ident)) },
        Err(err) => {
            errors.push(err.to_compile_error());
            quote! { "" }
        }
    };

    if !errors.is_empty() {
        return errors.into_iter().collect();
    }

    quote! {
        // SAFETY: the name embeds the module path (or an explicit unique name),
        // the type is not generic, and it is inhabited.
        #[automatically_derived]
        #[allow(unsafe_code)]
        unsafe impl ::strata_ecs::Component for #ident {
            const NAME: &'static str = #name;
        }
    }
}

fn check_fields(fields: &Fields, errors: &mut Vec<proc_macro2::TokenStream>) {
    for field in fields {
        check_type(&field.ty, errors);
    }
}

fn check_type(ty: &Type, errors: &mut Vec<proc_macro2::TokenStream>) {
    match ty {
        Type::Path(type_path) => {
            check_type_path(&type_path.path, ty.span(), errors);
        }
        Type::Array(array) => check_type(&array.elem, errors),
        Type::Tuple(tuple) => {
            for elem in &tuple.elems {
                check_type(elem, errors);
            }
        }
        Type::Paren(paren) => check_type(&paren.elem, errors),
        Type::Group(group) => check_type(&group.elem, errors),
        Type::Reference(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("References are not allowed in components. Components are owned values.\n\
                               Store the referenced data inline, or keep the Entity that owns it.");
            });
        }
        Type::Ptr(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Raw pointers are not allowed in components.\n\
                               Use entity references (Entity) instead.");
            });
        }
        Type::TraitObject(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Trait objects (dyn Trait) are not allowed in components.\n\
                               Use an enum or one tag component per variant.");
            });
        }
        Type::ImplTrait(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("impl Trait is not allowed in component fields. Use concrete types.");
            });
        }
        _ => {}
    }
}

fn check_type_path(path: &Path, span: proc_macro2::Span, errors: &mut Vec<proc_macro2::TokenStream>) {
    let Some(segment) = path.segments.last() else {
        return;
    };
    let type_name = segment.ident.to_string();

    if let Some((_, advice)) = FORBIDDEN_TYPES.iter().find(|(forbidden, _)| type_name == *forbidden) {
        let message = format!("Component field uses forbidden type `{type_name}`.\n\n{advice}");
        errors.push(quote_spanned! {
            span =>
            compile_error!(#message);
        });
        return;
    }

    if let PathArguments::AngleBracketed(args) = &segment.arguments {
        for arg in &args.args {
            if let GenericArgument::Type(inner) = arg {
                check_type(inner, errors);
            }
        }
    }
}
