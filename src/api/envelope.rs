//! The resolver envelope: every field of the API reports failures as data,
//! in the form `{ result, error }`, instead of using GraphQL errors.
//!
//! Resolvers are written as plain functions returning `Result<T>` and the
//! `#[enveloped]` attribute (see the `macros` crate) wraps each of them with
//! [`resolve`]. The GraphQL output type of such a field is
//! `<T as Enveloped>::Output`, which is declared once per result type with
//! [`envelope_output!`].

use std::future::Future;

use juniper::GraphQLObject;

use crate::{err::{self, ErrorKind, ErrorRecord}, prelude::*};
use super::Context;


/// Either the value of a resolver or the error it failed with. Exactly one of
/// both exists.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Ok(T),
    Err(ErrorRecord),
}

impl<T> Outcome<T> {
    pub(crate) fn into_parts(self) -> (Option<T>, Option<ErrorRecord>) {
        match self {
            Self::Ok(v) => (Some(v), None),
            Self::Err(e) => (None, Some(e)),
        }
    }
}

/// Types that can be the result of an enveloped resolver. `Output` is the
/// GraphQL type the field actually has.
pub(crate) trait Enveloped: Sized {
    type Output: From<Outcome<Self>>;
}

/// Runs one resolver and normalizes its outcome.
///
/// If the request carries an application error, the resolver is not run at
/// all and that error is reported instead. Otherwise the resolver's error (if
/// any) is classified. Internal errors are logged here, as this is the last
/// place where their details are known.
pub(crate) async fn resolve<T, E, F, Fut>(context: &Context, resolver: F) -> Outcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    if let Some(err) = &context.app_error {
        return Outcome::Err(err::classify(err));
    }

    match resolver().await {
        Ok(v) => Outcome::Ok(v),
        Err(e) => {
            let e = e.into();
            let record = err::classify(&e);
            if record.kind == ErrorKind::Internal {
                error!("Internal error in API resolver: {e:?}");
            } else {
                debug!("API resolver failed with {:?} error: {e:#}", record.kind);
            }
            Outcome::Err(record)
        }
    }
}


/// Result types of resolvers that may fail. Transparent namespace objects
/// are not among them: they have no `error` field to report a failure in.
#[diagnostic::on_unimplemented(
    message = "resolvers returning `{Self}` cannot return a `Result`",
    note = "`{Self}` is a transparent namespace object, let its nested fields fail instead",
)]
pub(crate) trait Fallible {}

/// Emitted by `#[enveloped]` for every resolver returning a `Result`.
pub(crate) fn assert_fallible<T: Fallible>() {}


/// Output of fields that do not return anything but can fail.
#[derive(Debug, GraphQLObject)]
pub(crate) struct EmptyOutput {
    pub(crate) error: Option<ErrorRecord>,
}

impl Enveloped for () {
    type Output = EmptyOutput;
}

impl Fallible for () {}

impl From<Outcome<()>> for EmptyOutput {
    fn from(outcome: Outcome<()>) -> Self {
        Self { error: outcome.into_parts().1 }
    }
}


/// Declares how a result type is enveloped.
///
/// - `envelope_output!(FooOutput => FooResult)` defines the object
///   `FooOutput { result: FooResult, error: Error }`.
/// - `envelope_output!(transparent FooQuery)` is for namespace objects: the
///   value itself is returned. Resolvers of such a type must not return a
///   `Result`. The only error left is an application error, in which case
///   the `Default` is returned and the nested fields report that error
///   themselves.
macro_rules! envelope_output {
    ($(#[$attr:meta])* $output:ident => $result:ty) => {
        $(#[$attr])*
        #[derive(juniper::GraphQLObject)]
        #[graphql(context = $crate::api::Context)]
        pub(crate) struct $output {
            pub(crate) result: Option<$result>,
            pub(crate) error: Option<$crate::err::ErrorRecord>,
        }

        impl $crate::api::envelope::Enveloped for $result {
            type Output = $output;
        }

        impl $crate::api::envelope::Fallible for $result {}

        impl From<$crate::api::envelope::Outcome<$result>> for $output {
            fn from(outcome: $crate::api::envelope::Outcome<$result>) -> Self {
                let (result, error) = outcome.into_parts();
                Self { result, error }
            }
        }
    };
    (transparent $ty:ty) => {
        impl $crate::api::envelope::Enveloped for $ty {
            type Output = $ty;
        }

        impl From<$crate::api::envelope::Outcome<$ty>> for $ty {
            fn from(outcome: $crate::api::envelope::Outcome<$ty>) -> Self {
                outcome.into_parts().0.unwrap_or_default()
            }
        }
    };
}

pub(crate) use envelope_output;
