use serde::{de::DeserializeOwned, Serialize};

use crate::{
    auth::User,
    prelude::*,
    store::{InvocationContext, Store},
};


/// The context that is accessible to every resolver in our API.
pub(crate) struct Context {
    pub(crate) invocation: InvocationContext,

    /// An error that occured before the GraphQL request was executed, e.g. an
    /// invalid bearer token. If set, every enveloped field reports this error
    /// instead of resolving.
    pub(crate) app_error: Option<anyhow::Error>,

    pub(crate) store: Store,
}

impl juniper::Context for Context {}

impl Context {
    pub(crate) fn new(store: Store, user: Option<User>) -> Self {
        Self {
            invocation: InvocationContext { user },
            app_error: None,
            store,
        }
    }

    pub(crate) fn with_app_error(mut self, err: impl Into<anyhow::Error>) -> Self {
        self.app_error = Some(err.into());
        self
    }

    /// Dispatches a store method on behalf of the current caller.
    pub(crate) async fn dispatch<R: DeserializeOwned>(
        &self,
        method: &str,
        payload: impl Serialize,
    ) -> Result<R> {
        self.store.dispatch_as(method, payload, &self.invocation).await
    }
}
