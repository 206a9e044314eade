//! Declarative authorization of store methods.
//!
//! Every method is registered with an [`Auth`] descriptor. Before the method
//! body runs, the [`AuthGate`] middleware evaluates that descriptor against
//! the payload and the invocation context (see [`authorize`]).

use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{err::StoreError, prelude::*};
use super::{middleware::{Call, Middleware, Next}, InvocationContext};


/// What a caller needs in order to invoke a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Requirement {
    /// Everyone, including anonymous callers.
    None,
    /// Any authenticated caller.
    Authenticated,
    /// Authenticated callers whose role is one of these.
    Roles(Vec<String>),
}

impl Requirement {
    /// A single role. The empty string names no role, so it only requires
    /// the caller to be authenticated.
    pub(crate) fn role(role: impl Into<String>) -> Self {
        let role = role.into();
        if role.is_empty() {
            Self::Authenticated
        } else {
            Self::Roles(vec![role])
        }
    }

    pub(crate) fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Roles(roles.into_iter().map(Into::into).collect())
    }
}

impl From<bool> for Requirement {
    fn from(authenticated: bool) -> Self {
        if authenticated { Self::Authenticated } else { Self::None }
    }
}

/// Arguments passed to a dynamic authorization predicate.
#[derive(Debug, Clone)]
pub(crate) struct AuthArgs {
    pub(crate) payload: Value,
    pub(crate) context: InvocationContext,
}

/// Result of a predicate. `None` means "nothing specified", which is treated
/// like [`Requirement::Authenticated`].
pub(crate) type PredicateResult = Result<Option<Requirement>>;

type Predicate = Arc<dyn Fn(AuthArgs) -> BoxFuture<'static, PredicateResult> + Send + Sync>;

/// The authorization descriptor of a method. Immutable once the method is
/// registered.
#[derive(Clone)]
pub(crate) enum Auth {
    Static(Requirement),
    Dynamic(Predicate),
}

impl Auth {
    /// No check at all.
    pub(crate) fn none() -> Self {
        Self::Static(Requirement::None)
    }

    pub(crate) fn authenticated() -> Self {
        Self::Static(Requirement::Authenticated)
    }

    pub(crate) fn role(role: impl Into<String>) -> Self {
        Self::Static(Requirement::role(role))
    }

    /// An asynchronous predicate computing the requirement per invocation.
    pub(crate) fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn(AuthArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PredicateResult> + Send + 'static,
    {
        Self::Dynamic(Arc::new(move |args| f(args).boxed()))
    }

    /// Evaluates this descriptor to the effective requirement of one
    /// invocation. Errors of predicates are passed through unchanged.
    pub(crate) async fn requirement(
        &self,
        payload: &Value,
        context: &InvocationContext,
    ) -> Result<Requirement> {
        match self {
            Self::Static(requirement) => Ok(requirement.clone()),
            Self::Dynamic(predicate) => {
                let args = AuthArgs { payload: payload.clone(), context: context.clone() };
                let requirement = predicate(args).await?;
                Ok(requirement.unwrap_or(Requirement::Authenticated))
            }
        }
    }
}

#[cfg(test)]
impl Auth {
    pub(crate) fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Static(Requirement::roles(roles))
    }

    /// A synchronous predicate computing the requirement per invocation.
    pub(crate) fn from_fn<F>(f: F) -> Self
    where
        F: Fn(AuthArgs) -> PredicateResult + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(move |args| futures::future::ready(f(args)).boxed()))
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::none()
    }
}

impl From<bool> for Auth {
    fn from(authenticated: bool) -> Self {
        Self::Static(authenticated.into())
    }
}

impl From<Requirement> for Auth {
    fn from(requirement: Requirement) -> Self {
        Self::Static(requirement)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(requirement) => f.debug_tuple("Static").field(requirement).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}


/// Admission check of one invocation. Returns an `authentication` error if a
/// user is required but missing and an `authorization` error if the user's
/// role is not allowed.
pub(crate) async fn authorize(
    payload: &Value,
    auth: &Auth,
    context: &InvocationContext,
) -> Result<()> {
    let requirement = auth.requirement(payload, context).await?;
    check(&requirement, context)?;
    Ok(())
}

fn check(requirement: &Requirement, context: &InvocationContext) -> Result<(), StoreError> {
    if *requirement == Requirement::None {
        return Ok(());
    }

    let Some(user) = &context.user else {
        return Err(StoreError::authentication("You have to login first"));
    };

    if let Requirement::Roles(roles) = requirement {
        let allowed = user.role().is_some_and(|role| roles.iter().any(|r| r == role));
        if !allowed {
            return Err(StoreError::authorization(format!(
                "Only '{}' is allowed to access this resource",
                roles.join(","),
            )));
        }
    }

    Ok(())
}


/// The middleware running [`authorize`] before every method. It is always
/// part of the dispatch chain.
pub(crate) struct AuthGate;

impl Middleware for AuthGate {
    fn call<'a>(&'a self, payload: Value, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>> {
        gate(payload, call, next).boxed()
    }
}

async fn gate(payload: Value, call: &Call, next: Next<'_>) -> Result<Value> {
    if let Err(e) = authorize(&payload, call.auth(), call.context()).await {
        trace!(method = call.name(), "Rejected by authorization gate: {e}");
        return Err(e);
    }
    next.run(payload).await
}
