use proc_macro::TokenStream as TokenStream1;


mod envelope;


/// Wraps every field resolver of a `juniper` object in the resolver envelope.
///
/// Put this instead of `#[juniper::graphql_object]` on the `impl` block of a
/// GraphQL object. All arguments are forwarded to `graphql_object`;
/// `context = ...` is required. Resolvers are written as usual, but return
/// `Result<T>` (or just `T`) and the GraphQL type of the field becomes
/// `<T as crate::api::Enveloped>::Output`. Each field first checks the
/// request's application error, then runs the resolver and turns its outcome
/// into the output type via `crate::api::envelope::resolve`.
///
/// Methods marked with `#[graphql(ignore)]` are passed through unchanged.
#[proc_macro_attribute]
pub fn enveloped(attr: TokenStream1, item: TokenStream1) -> TokenStream1 {
    envelope::run(attr.into(), item.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
