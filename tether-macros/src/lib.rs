use proc_macro::TokenStream;

mod bindable;

/// Derive macro for implementing the `Bindable` trait.
///
/// Every named field becomes a row of the record's accessor table. Leaf
/// fields must implement `FieldType`; fields holding other records (or
/// `Vec`/`Option`/`Box` of records) are marked `#[bind(nested)]`.
///
/// # Field attributes
///
/// - `#[bind(rename = "wire_name")]` - bind and encode under another name
/// - `#[bind(nested)]` - delegate to the field's own `Bindable` impl
/// - `#[bind(skip)]` - leave the field out of the table entirely
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Bindable, Default)]
/// struct Todo {
///     title: String,
///     #[bind(rename = "done")]
///     completed: bool,
///     #[bind(nested)]
///     tags: Vec<Tag>,
///     #[bind(skip)]
///     cache: Option<String>,
/// }
/// ```
#[proc_macro_derive(Bindable, attributes(bind))]
pub fn derive_bindable(input: TokenStream) -> TokenStream {
    bindable::derive_bindable_impl(input)
}
