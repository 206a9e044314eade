use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote, ToTokens};
use syn::{
    Attribute, Error, FnArg, GenericArgument, Ident, ImplItem, ImplItemFn, ItemImpl, Meta, Pat,
    PathArguments, ReturnType, Token, Type,
    parse::Parser,
    punctuated::Punctuated,
    spanned::Spanned,
};


/// Names under which `juniper` recognizes the context argument.
const CONTEXT_ARG_NAMES: &[&str] = &["context", "ctx", "_context", "_ctx"];


/// Entry point: parses the input and generates output.
pub(crate) fn run(attr: TokenStream, item: TokenStream) -> Result<TokenStream, Error> {
    let context = context_type(attr.clone())?;
    let input = syn::parse2::<ItemImpl>(item)?;
    if let Some((_, path, _)) = &input.trait_ {
        return Err(Error::new(path.span(), "`#[enveloped]` only works on inherent `impl` blocks"));
    }

    let mut plain = Vec::new();
    let mut fields = Vec::new();
    for item in &input.items {
        let method = match item {
            ImplItem::Fn(method) if !graphql_flags(&method.attrs)?.iter().any(|f| is_ignore(f)) => method,
            other => {
                fields.push(other.to_token_stream());
                continue;
            }
        };

        let out = envelope_fn(method, &context)?;
        plain.push(out.plain);
        fields.push(out.field);
    }

    let attrs = &input.attrs;
    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #self_ty #where_clause {
            #(#plain)*
        }

        #(#attrs)*
        #[::juniper::graphql_object(#attr)]
        impl #impl_generics #self_ty #where_clause {
            #(#fields)*
        }
    })
}

fn context_type(attr: TokenStream) -> Result<Type, Error> {
    let args = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;
    args.iter()
        .find_map(|arg| match arg {
            Meta::NameValue(nv) if nv.path.is_ident("context") || nv.path.is_ident("Context") => {
                Some(syn::parse2::<Type>(nv.value.to_token_stream()))
            }
            _ => None,
        })
        .unwrap_or_else(|| Err(Error::new(
            Span::call_site(),
            "missing `context = ...` argument for `#[enveloped]`",
        )))
}


struct Enveloped {
    /// The original method, renamed and stripped of GraphQL attributes.
    plain: TokenStream,
    /// The GraphQL field calling `plain` inside the envelope.
    field: TokenStream,
}

fn envelope_fn(method: &ImplItemFn, context: &Type) -> Result<Enveloped, Error> {
    let sig = &method.sig;
    let name = &sig.ident;
    let inner_name = format_ident!("__enveloped_{}", name);

    let mut has_receiver = false;
    let mut context_arg = None;
    let mut arg_names = Vec::new();
    for input in &sig.inputs {
        match input {
            FnArg::Receiver(r) => {
                if r.reference.is_none() {
                    return Err(Error::new(r.span(), "resolvers have to take `self` by reference"));
                }
                has_receiver = true;
            }
            FnArg::Typed(arg) => {
                let Pat::Ident(pat) = &*arg.pat else {
                    return Err(Error::new(arg.pat.span(), "resolver arguments must be plain identifiers"));
                };
                let is_context = CONTEXT_ARG_NAMES.contains(&pat.ident.to_string().as_str())
                    || graphql_flags(&arg.attrs)?.iter().any(|f| f == "context");
                if is_context {
                    context_arg = Some(pat.ident.clone());
                }
                arg_names.push(pat.ident.clone());
            }
        }
    }

    // The original method, callable under a new name.
    let mut inner = method.clone();
    inner.sig.ident = inner_name.clone();
    inner.vis = syn::Visibility::Inherited;
    inner.attrs.retain(|a| !a.path().is_ident("graphql") && !a.path().is_ident("doc"));
    for input in &mut inner.sig.inputs {
        if let FnArg::Typed(arg) = input {
            arg.attrs.clear();
        }
    }

    // The field needs the context even if the resolver itself does not.
    let mut inputs = sig.inputs.clone();
    let context_arg = match context_arg {
        Some(ident) => ident,
        None => {
            let ident = Ident::new("context", Span::call_site());
            inputs.push(syn::parse_quote!(#ident: &#context));
            ident
        }
    };

    let mut call = if has_receiver {
        quote! { self.#inner_name(#(#arg_names),*) }
    } else {
        quote! { Self::#inner_name(#(#arg_names),*) }
    };
    if sig.asyncness.is_some() {
        call = quote! { #call.await };
    }

    let (result_ty, fallible) = result_type(&sig.output);
    let check = if fallible {
        quote! { crate::api::envelope::assert_fallible::<#result_ty>(); }
    } else {
        call = quote! { ::std::result::Result::<_, ::std::convert::Infallible>::Ok(#call) };
        quote! {}
    };

    let vis = &method.vis;
    let attrs = method.attrs.iter()
        .filter(|a| a.path().is_ident("graphql") || a.path().is_ident("doc"));
    let field = quote! {
        #(#attrs)*
        #vis async fn #name(#inputs) -> <#result_ty as crate::api::Enveloped>::Output {
            #check
            let outcome = crate::api::envelope::resolve(
                #context_arg,
                move || async move { #call },
            ).await;
            ::std::convert::From::from(outcome)
        }
    };

    Ok(Enveloped { plain: inner.into_token_stream(), field })
}

/// Splits the return type into the result type `T` and whether the resolver
/// can fail. Every type named `...Result<T, ...>` is treated as fallible.
fn result_type(output: &ReturnType) -> (Type, bool) {
    let ReturnType::Type(_, ty) = output else {
        return (syn::parse_quote!(()), false);
    };

    if let Type::Path(path) = &**ty {
        let last = path.path.segments.last();
        if let Some(segment) = last.filter(|s| s.ident.to_string().ends_with("Result")) {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(t)) = args.args.first() {
                    return (t.clone(), true);
                }
            }
        }
    }

    ((**ty).clone(), false)
}

/// Returns the bare flags (like `ignore`) of all `#[graphql(...)]` attributes.
fn graphql_flags(attrs: &[Attribute]) -> Result<Vec<String>, Error> {
    let mut flags = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("graphql")) {
        attr.parse_nested_meta(|meta| {
            if meta.input.peek(Token![=]) {
                meta.value()?.parse::<syn::Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            } else if let Some(ident) = meta.path.get_ident() {
                flags.push(ident.to_string());
            }
            Ok(())
        })?;
    }
    Ok(flags)
}

fn is_ignore(flag: &str) -> bool {
    flag == "ignore" || flag == "skip"
}


#[cfg(test)]
mod tests {
    use quote::quote;

    use super::run;


    fn expand(item: proc_macro2::TokenStream) -> String {
        run(quote! { context = Context }, item).unwrap().to_string()
    }

    #[test]
    fn fallible_resolvers_are_checked() {
        let out = expand(quote! {
            impl Query {
                fn count() -> Result<i32> { Ok(1) }
            }
        });
        assert!(out.contains("assert_fallible :: < i32 >"), "{out}");
    }

    #[test]
    fn plain_resolvers_are_not_checked() {
        let out = expand(quote! {
            impl Query {
                fn nested() -> Nested { Nested }
            }
        });
        assert!(!out.contains("assert_fallible"), "{out}");
        assert!(out.contains("Infallible"), "{out}");
    }

    #[test]
    fn trait_impls_are_rejected() {
        let err = run(quote! { context = Context }, quote! { impl Foo for Query {} }).unwrap_err();
        assert!(err.to_string().contains("inherent"));
    }
}
