use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use futures::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    auth::User,
    err::{classify, ErrorKind, StoreError},
    prelude::*,
};
use super::*;


const AUTH_MSG: &str = "You have to login first";
const ADMIN_MSG: &str = "Only 'admin' is allowed to access this resource";
const SUPERADMIN_MSG: &str = "Only 'admin,superadmin' is allowed to access this resource";


fn user(claims: Value) -> InvocationContext {
    let Value::Object(claims) = claims else { panic!("claims must be an object") };
    InvocationContext::for_user(User::from_claims(claims))
}

/// A user without any claims, i.e. without role.
fn someone() -> InvocationContext {
    user(json!({}))
}

fn anonymous() -> InvocationContext {
    InvocationContext::anonymous()
}

async fn noop(_: Value, _: MethodContext) -> Result<Value> {
    Ok(Value::Null)
}

/// Asserts that the dispatch failed with the given kind and message.
async fn rejected(store: &Store, method: &str, context: InvocationContext, kind: ErrorKind, msg: &str) {
    let err = store.dispatch(method, Value::Null, &context).await.unwrap_err();
    let record = classify(&err);
    assert_eq!(record.kind, kind, "method {method}, context {context:?}");
    assert_eq!(record.message, msg, "method {method}, context {context:?}");
}

async fn accepted(store: &Store, method: &str, context: InvocationContext) {
    if let Err(e) = store.dispatch(method, Value::Null, &context).await {
        panic!("dispatch of {method} with {context:?} failed: {e:#}");
    }
}

/// The same six descriptors once as static values and once as async
/// predicates. `None` is "nothing specified".
fn descriptors() -> Vec<Option<Requirement>> {
    vec![
        Some(Requirement::Authenticated),
        Some(Requirement::None),
        None,
        Some(Requirement::Authenticated),
        Some(Requirement::role("admin")),
        Some(Requirement::roles(["admin", "superadmin"])),
    ]
}

fn gate_store(dynamic: bool) -> Store {
    let mut builder = Store::builder();
    for (i, requirement) in descriptors().into_iter().enumerate() {
        let auth = if dynamic {
            Auth::dynamic(move |_| {
                let requirement = requirement.clone();
                async move { Ok(requirement) }
            })
        } else {
            requirement.map(Auth::from).unwrap_or_default()
        };
        builder.define(&format!("m{}", i + 1), auth, noop);
    }
    builder.build().unwrap()
}

async fn check_common_gate_rules(store: &Store) {
    use ErrorKind::{Authentication, Authorization};

    rejected(store, "m1", anonymous(), Authentication, AUTH_MSG).await;
    accepted(store, "m1", someone()).await;

    accepted(store, "m2", anonymous()).await;
    accepted(store, "m2", someone()).await;

    rejected(store, "m4", anonymous(), Authentication, AUTH_MSG).await;
    accepted(store, "m4", someone()).await;

    rejected(store, "m5", anonymous(), Authentication, AUTH_MSG).await;
    rejected(store, "m5", someone(), Authorization, ADMIN_MSG).await;
    rejected(store, "m5", user(json!({ "role": "member" })), Authorization, ADMIN_MSG).await;
    accepted(store, "m5", user(json!({ "role": "admin" }))).await;

    rejected(store, "m6", anonymous(), Authentication, AUTH_MSG).await;
    rejected(store, "m6", someone(), Authorization, SUPERADMIN_MSG).await;
    rejected(store, "m6", user(json!({ "role": "member" })), Authorization, SUPERADMIN_MSG).await;
    accepted(store, "m6", user(json!({ "role": "admin" }))).await;
    accepted(store, "m6", user(json!({ "role": "superadmin" }))).await;
}

#[tokio::test]
async fn gate_static() {
    let store = gate_store(false);
    check_common_gate_rules(&store).await;

    // Nothing specified statically: no check.
    accepted(&store, "m3", anonymous()).await;
    accepted(&store, "m3", someone()).await;
}

#[tokio::test]
async fn gate_dynamic() {
    let store = gate_store(true);
    check_common_gate_rules(&store).await;

    // A predicate that specifies nothing requires authentication.
    rejected(&store, "m3", anonymous(), ErrorKind::Authentication, AUTH_MSG).await;
    accepted(&store, "m3", someone()).await;
}

#[tokio::test]
async fn gate_sync_predicate() {
    let mut builder = Store::builder();
    builder.define("open", Auth::from_fn(|_| Ok(Some(Requirement::None))), noop);
    builder.define("unspecified", Auth::from_fn(|_| Ok(None)), noop);
    builder.define(
        "by_payload",
        Auth::from_fn(|args| {
            let public = args.payload.get("public").and_then(Value::as_bool) == Some(true);
            Ok(Some(if public { Requirement::None } else { Requirement::role("admin") }))
        }),
        noop,
    );
    let store = builder.build().unwrap();

    accepted(&store, "open", anonymous()).await;
    rejected(&store, "unspecified", anonymous(), ErrorKind::Authentication, AUTH_MSG).await;

    store.dispatch("by_payload", json!({ "public": true }), &anonymous()).await.unwrap();
    let err = store.dispatch("by_payload", json!({ "public": false }), &someone()).await.unwrap_err();
    assert_eq!(classify(&err).message, ADMIN_MSG);
}

#[tokio::test]
async fn gate_empty_role_list() {
    let mut builder = Store::builder();
    builder.define("nobody", Auth::roles(Vec::<String>::new()), noop);
    let store = builder.build().unwrap();

    rejected(&store, "nobody", anonymous(), ErrorKind::Authentication, AUTH_MSG).await;
    rejected(
        &store,
        "nobody",
        user(json!({ "role": "admin" })),
        ErrorKind::Authorization,
        "Only '' is allowed to access this resource",
    ).await;
}

#[tokio::test]
async fn gate_empty_role_name() {
    let mut builder = Store::builder();
    builder.define("members", Auth::role(""), noop);
    builder.define("members_dyn", Auth::dynamic(|_| async { Ok(Some(Requirement::role(""))) }), noop);
    let store = builder.build().unwrap();

    assert_eq!(Requirement::role(""), Requirement::Authenticated);
    for method in ["members", "members_dyn"] {
        rejected(&store, method, anonymous(), ErrorKind::Authentication, AUTH_MSG).await;
        accepted(&store, method, someone()).await;
        accepted(&store, method, user(json!({ "role": "member" }))).await;
    }
}

#[tokio::test]
async fn predicate_receives_payload_and_context() {
    let seen = Arc::new(Mutex::new(None));
    let seen2 = Arc::clone(&seen);

    let mut builder = Store::builder();
    builder.define(
        "m1",
        Auth::from_fn(move |args| {
            *seen2.lock().unwrap() = Some(args);
            Ok(Some(Requirement::None))
        }),
        noop,
    );
    let store = builder.build().unwrap();

    let context = user(json!({ "id": 7 }));
    store.dispatch("m1", json!({ "x": 1 }), &context).await.unwrap();

    let args = seen.lock().unwrap().take().unwrap();
    assert_eq!(args.payload, json!({ "x": 1 }));
    assert_eq!(args.context.user, context.user);
}

#[tokio::test]
async fn predicate_error_propagates_and_body_does_not_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);

    let mut builder = Store::builder();
    builder.define("m1", Auth::dynamic(|_| async { Err(anyhow!("test")) }), move |_: Value, _| {
        calls2.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });
    builder.define(
        "m2",
        Auth::from_fn(|_| Err(StoreError::not_found("no such thing").into())),
        noop,
    );
    let store = builder.build().unwrap();

    let err = store.dispatch("m1", Value::Null, &someone()).await.unwrap_err();
    assert_eq!(err.to_string(), "test");
    assert_eq!(classify(&err).kind, ErrorKind::Internal);

    let err = store.dispatch("m2", Value::Null, &someone()).await.unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::NotFound);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_call_never_runs_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);

    let mut builder = Store::builder();
    builder.define("secret", Auth::role("admin"), move |_: Value, _| {
        calls2.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });
    let store = builder.build().unwrap();

    assert!(store.dispatch("secret", Value::Null, &anonymous()).await.is_err());
    assert!(store.dispatch("secret", Value::Null, &someone()).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.dispatch("secret", Value::Null, &user(json!({ "role": "admin" }))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}


#[derive(Debug, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

#[tokio::test]
async fn typed_payload() {
    let mut builder = Store::builder();
    builder.scope("math", |math| {
        math.define("add", Auth::none(), |p: Add, _| async move { Ok(p.a + p.b) });
    });
    let store = builder.build().unwrap();

    assert!(store.has_method("math/add"));
    assert!(!store.has_method("add"));

    let sum: i64 = store.dispatch_as("math/add", json!({ "a": 1, "b": 2 }), &anonymous())
        .await
        .unwrap();
    assert_eq!(sum, 3);

    let err = store.dispatch("math/add", json!({ "a": "one" }), &anonymous()).await.unwrap_err();
    let record = classify(&err);
    assert_eq!(record.kind, ErrorKind::Validation);
    assert_eq!(record.reasons.as_ref().map(Vec::len), Some(1));
    assert_eq!(record.reasons.unwrap()[0].path, "payload");
}

#[tokio::test]
async fn undefined_method() {
    let store = Store::builder().build().unwrap();
    let err = store.dispatch("nope", Value::Null, &anonymous()).await.unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::NotImplemented);
}

#[test]
fn duplicate_names() {
    let mut builder = Store::builder();
    builder.define("a/b", Auth::none(), noop);
    builder.scope("a", |a| { a.define("b", Auth::none(), noop); });
    assert!(builder.build().is_err());
}

#[test]
fn nested_scopes() {
    let mut builder = Store::builder();
    builder.scope("api", |api| {
        api.scope("/posts/", |posts| { posts.define("create", Auth::none(), noop); });
        api.define("ping", Auth::none(), noop);
    });
    builder.define("root", Auth::none(), noop);
    let store = builder.build().unwrap();

    assert!(store.has_method("api/posts/create"));
    assert!(store.has_method("api/ping"));
    assert!(store.has_method("root"));
}

#[tokio::test]
async fn method_context_defaults_and_cid() {
    let seen = Arc::new(Mutex::new(vec![]));
    let seen2 = Arc::clone(&seen);

    let mut defaults = Map::new();
    defaults.insert("a".into(), json!({}));
    defaults.insert("b".into(), json!("123"));
    defaults.insert("cid".into(), json!("abc"));

    let mut builder = Store::builder();
    builder.method_context(defaults);
    builder.define("test", Auth::none(), move |_: Value, cx: MethodContext| {
        seen2.lock().unwrap().push(cx);
        async { Ok(()) }
    });
    let store = builder.build().unwrap();

    store.dispatch("test", Value::Null, &anonymous()).await.unwrap();
    store.dispatch("test", Value::Null, &anonymous()).await.unwrap();

    let seen = seen.lock().unwrap();
    let cx = &seen[0];
    assert_eq!(cx.get("a"), Some(&json!({})));
    assert_eq!(cx.get("b"), Some(&json!("123")));
    assert_eq!(&*cx.method, "test");
    assert_ne!(cx.cid.to_string(), "abc");
    assert_ne!(seen[0].cid, seen[1].cid);
}

#[tokio::test]
async fn nested_dispatch_keeps_caller() {
    let mut builder = Store::builder();
    builder.define("whoami", Auth::authenticated(), |_: Value, cx: MethodContext| async move {
        Ok(cx.user().and_then(|u| u.id()).cloned())
    });
    builder.define("outer", Auth::none(), |_: Value, cx: MethodContext| async move {
        let id: Option<Value> = cx.dispatch("whoami", ()).await?;
        Ok(id)
    });
    let store = builder.build().unwrap();

    let id: Option<Value> = store.dispatch_as("outer", (), &user(json!({ "id": 5 })))
        .await
        .unwrap();
    assert_eq!(id, Some(json!(5)));

    let err = store.dispatch("outer", (), &anonymous()).await.unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::Authentication);
}


/// Records the order in which layers see a call and whether it got past the
/// gate.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Recorder {
    fn call<'a>(&'a self, payload: Value, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>> {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, call.name()));
        next.run(payload)
    }
}

/// Replaces the payload before the handler sees it.
struct Rewrite;

impl Middleware for Rewrite {
    fn call<'a>(&'a self, _: Value, _: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>> {
        async move { next.run(json!("rewritten")).await }.boxed()
    }
}

#[tokio::test]
async fn layers_run_after_gate_in_order() {
    let log = Arc::new(Mutex::new(vec![]));

    let mut builder = Store::builder();
    builder
        .log_dispatches(true)
        .layer(Recorder { name: "first", log: Arc::clone(&log) })
        .layer(Recorder { name: "second", log: Arc::clone(&log) })
        .layer(Rewrite)
        .define("echo", Auth::authenticated(), |p: Value, _| async move { Ok(p) });
    let store = builder.build().unwrap();

    // Rejected by the gate: custom layers never see the call.
    assert!(store.dispatch("echo", json!("original"), &anonymous()).await.is_err());
    assert!(log.lock().unwrap().is_empty());

    let out = store.dispatch("echo", json!("original"), &someone()).await.unwrap();
    assert_eq!(out, json!("rewritten"));
    assert_eq!(*log.lock().unwrap(), ["first:echo", "second:echo"]);
}
