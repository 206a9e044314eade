//! The store: a registry of named business methods that are invoked
//! ("dispatched") by name with a JSON payload.
//!
//! Methods are registered on a [`StoreBuilder`] during startup, which is then
//! frozen into an immutable, cheaply clonable [`Store`]. Every dispatch runs
//! through a chain of middlewares: the dispatch log (if enabled), the
//! authorization gate and finally all custom layers.

use std::{collections::HashMap, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{auth::User, err::StoreError, prelude::*};


mod auth;
mod middleware;

#[cfg(test)]
mod tests;

pub(crate) use self::{
    auth::{Auth, AuthArgs, PredicateResult, Requirement},
    middleware::{Call, Middleware, Next},
};


#[derive(Debug, confique::Config)]
pub(crate) struct StoreConfig {
    /// If set to `true`, every dispatched method call is logged (with level
    /// 'info') before and after it runs, including its correlation id.
    #[config(default = false)]
    pub(crate) log_dispatches: bool,

    /// Default values that are visible to every method handler via its
    /// method context. Example:
    ///
    ///    [store.method_context]
    ///    tenant = "demo"
    pub(crate) method_context: Option<Map<String, Value>>,
}


/// Ambient data of one invocation, shared by all calls made while handling
/// one request.
#[derive(Debug, Clone, Default)]
pub(crate) struct InvocationContext {
    /// The authenticated caller. `None` means anonymous.
    pub(crate) user: Option<User>,
}

#[cfg(test)]
impl InvocationContext {
    pub(crate) fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn for_user(user: User) -> Self {
        Self { user: Some(user) }
    }
}

/// What a method handler gets in addition to its payload.
#[derive(Clone)]
pub(crate) struct MethodContext {
    pub(crate) context: InvocationContext,
    pub(crate) method: Arc<str>,
    /// Correlation id, fresh for every dispatch.
    pub(crate) cid: Uuid,
    extra: Arc<Map<String, Value>>,
    store: Store,
}

impl MethodContext {
    pub(crate) fn user(&self) -> Option<&User> {
        self.context.user.as_ref()
    }

    /// Looks up one of the configured default values.
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Dispatches another method on behalf of the same caller.
    pub(crate) async fn dispatch<R: DeserializeOwned>(
        &self,
        method: &str,
        payload: impl Serialize,
    ) -> Result<R> {
        self.store.dispatch_as(method, payload, &self.context).await
    }
}


type Handler = Arc<dyn Fn(Value, MethodContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub(crate) struct Method {
    name: Arc<str>,
    auth: Auth,
    handler: Handler,
}


/// Collects methods and settings. Turned into a [`Store`] via [`Self::build`].
#[derive(Default)]
pub(crate) struct StoreBuilder {
    prefix: String,
    methods: Vec<Method>,
    layers: Vec<Arc<dyn Middleware>>,
    method_context: Map<String, Value>,
    log_dispatches: bool,
}

impl StoreBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Applies the settings from the configuration file.
    pub(crate) fn configure(&mut self, config: &StoreConfig) -> &mut Self {
        if let Some(map) = &config.method_context {
            self.method_context(map.clone());
        }
        self.log_dispatches(config.log_dispatches)
    }

    /// Registers a method. The payload is deserialized into `P` (a mismatch
    /// is a validation error) and the result is serialized to JSON.
    pub(crate) fn define<P, R, F, Fut>(
        &mut self,
        name: &str,
        auth: impl Into<Auth>,
        handler: F,
    ) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, MethodContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let name = if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{name}", self.prefix)
        };

        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |payload, cx| {
            let handler = Arc::clone(&handler);
            async move { call_typed::<P, R, F, Fut>(&*handler, payload, cx).await }.boxed()
        });

        self.methods.push(Method {
            name: name.into(),
            auth: auth.into(),
            handler: erased,
        });
        self
    }

    /// Registers all methods defined by `f` under the given prefix, e.g. with
    /// prefix `api/posts` a method `create` becomes `api/posts/create`.
    pub(crate) fn scope(&mut self, prefix: &str, f: impl FnOnce(&mut Self)) -> &mut Self {
        let outer = self.prefix.clone();
        self.prefix = [outer.as_str(), prefix.trim_matches('/')]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        f(self);
        self.prefix = outer;
        self
    }

    /// Appends a custom middleware. It runs after the authorization gate.
    pub(crate) fn layer(&mut self, middleware: impl Middleware) -> &mut Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Adds default values visible to every handler. Later values override
    /// earlier ones with the same key.
    pub(crate) fn method_context(&mut self, values: Map<String, Value>) -> &mut Self {
        self.method_context.extend(values);
        self
    }

    pub(crate) fn log_dispatches(&mut self, enabled: bool) -> &mut Self {
        self.log_dispatches = enabled;
        self
    }

    /// Freezes the registry. Fails if two methods have the same name.
    pub(crate) fn build(self) -> Result<Store> {
        let mut methods = HashMap::with_capacity(self.methods.len());
        for method in self.methods {
            let name = method.name.clone();
            if methods.insert(name.clone(), Arc::new(method)).is_some() {
                bail!("store method '{name}' is defined more than once");
            }
        }

        let mut chain: Vec<Arc<dyn Middleware>> = vec![];
        if self.log_dispatches {
            chain.push(Arc::new(middleware::DispatchLog));
        }
        chain.push(Arc::new(auth::AuthGate));
        chain.extend(self.layers);

        debug!("Built store with {} methods", methods.len());
        Ok(Store(Arc::new(Inner {
            methods,
            chain,
            method_context: Arc::new(self.method_context),
        })))
    }
}

async fn call_typed<P, R, F, Fut>(handler: &F, payload: Value, cx: MethodContext) -> Result<Value>
where
    P: DeserializeOwned,
    R: Serialize,
    F: Fn(P, MethodContext) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let payload = serde_json::from_value::<P>(payload).map_err(|e| {
        StoreError::validation("Invalid payload").add_reason("payload", e.to_string())
    })?;
    let out = handler(payload, cx).await?;
    serde_json::to_value(out).context("failed to serialize result of store method")
}


/// The frozen method registry. Cloning is cheap.
#[derive(Clone)]
pub(crate) struct Store(Arc<Inner>);

struct Inner {
    methods: HashMap<Arc<str>, Arc<Method>>,
    chain: Vec<Arc<dyn Middleware>>,
    method_context: Arc<Map<String, Value>>,
}

impl Store {
    pub(crate) fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Invokes the method `name`, passing the call through the whole chain.
    pub(crate) async fn dispatch(
        &self,
        name: &str,
        payload: impl Serialize,
        context: &InvocationContext,
    ) -> Result<Value> {
        let method = self.0.methods.get(name)
            .ok_or_else(|| StoreError::not_implemented(format!("Method '{name}' is not implemented")))?;
        let payload = serde_json::to_value(payload).context("failed to serialize payload")?;

        let call = Call {
            method: Arc::clone(method),
            cx: MethodContext {
                context: context.clone(),
                method: method.name.clone(),
                cid: Uuid::new_v4(),
                extra: Arc::clone(&self.0.method_context),
                store: self.clone(),
            },
        };
        Next { rest: &self.0.chain, call: &call }.run(payload).await
    }

    #[cfg(test)]
    pub(crate) fn has_method(&self, name: &str) -> bool {
        self.0.methods.contains_key(name)
    }

    /// Like [`Self::dispatch`], but deserializes the result.
    pub(crate) async fn dispatch_as<R: DeserializeOwned>(
        &self,
        name: &str,
        payload: impl Serialize,
        context: &InvocationContext,
    ) -> Result<R> {
        let value = self.dispatch(name, payload, context).await?;
        serde_json::from_value(value)
            .with_context(|| format!("unexpected result of store method '{name}'"))
    }
}
