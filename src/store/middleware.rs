//! The dispatch chain. Each dispatched call passes through all middlewares in
//! order before the method handler is invoked.

use std::{sync::Arc, time::Instant};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{err, prelude::*};
use super::{auth::Auth, InvocationContext, Method, MethodContext};


/// Something that wraps the invocation of store methods. Implementations
/// either call `next.run(payload)` to continue the chain (possibly with a
/// modified payload) or return early.
pub(crate) trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, payload: Value, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>>;
}

/// Information about the call currently passing through the chain.
pub(crate) struct Call {
    pub(super) method: Arc<Method>,
    pub(super) cx: MethodContext,
}

impl Call {
    pub(crate) fn name(&self) -> &str {
        &self.method.name
    }

    pub(crate) fn auth(&self) -> &Auth {
        &self.method.auth
    }

    pub(crate) fn context(&self) -> &InvocationContext {
        &self.cx.context
    }
}

/// The remainder of the chain.
#[derive(Clone, Copy)]
pub(crate) struct Next<'a> {
    pub(super) rest: &'a [Arc<dyn Middleware>],
    pub(super) call: &'a Call,
}

impl<'a> Next<'a> {
    pub(crate) fn run(self, payload: Value) -> BoxFuture<'a, Result<Value>> {
        match self.rest.split_first() {
            Some((first, rest)) => first.call(payload, self.call, Next { rest, call: self.call }),
            None => (self.call.method.handler)(payload, self.call.cx.clone()),
        }
    }
}


/// Logs every call before and after running it, including the correlation
/// id, the caller and the outcome.
pub(crate) struct DispatchLog;

impl Middleware for DispatchLog {
    fn call<'a>(&'a self, payload: Value, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>> {
        log_call(payload, call, next).boxed()
    }
}

async fn log_call(payload: Value, call: &Call, next: Next<'_>) -> Result<Value> {
    let cid = call.cx.cid;
    let user = call.context().user.as_ref().map(|u| u.claims());
    info!(%cid, method = call.name(), ?user, "Dispatching");
    trace!(%cid, %payload, "Dispatch payload");

    let before = Instant::now();
    let out = next.run(payload).await;
    let elapsed = before.elapsed();

    match &out {
        Ok(_) => info!(%cid, method = call.name(), ?elapsed, "Dispatch succeeded"),
        Err(e) => {
            let record = err::classify(e);
            warn!(
                %cid,
                method = call.name(),
                ?elapsed,
                kind = ?record.kind,
                "Dispatch failed: {e:#}",
            );
        }
    }

    out
}
