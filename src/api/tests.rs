use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use juniper::{graphql_value, http::GraphQLRequest, EmptyMutation, EmptySubscription, Variables};
use serde_json::json;
use store_graphql_macros::enveloped;

use crate::{
    auth::User,
    err::{ErrorKind, StoreError},
    prelude::*,
    store::Store,
};
use super::{envelope::envelope_output, Context, Schema};


static GUARDED_CALLS: AtomicUsize = AtomicUsize::new(0);

struct Query;

#[enveloped(context = Context)]
impl Query {
    fn counted() -> Result<i32> {
        Ok(42)
    }

    /// Only called by the application error test.
    fn guarded() -> Result<i32> {
        GUARDED_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    fn plain() -> i32 {
        7
    }

    fn fails() -> Result<()> {
        bail!("connection to 10.0.0.3 refused")
    }

    async fn invalid() -> Result<()> {
        Err(ErrorKind::Validation.error()
            .add_reason("a", "b")
            .add_coded_reason("input.title", "too long", "max_length")
            .into())
    }

    fn unit() {}

    async fn whoami(context: &Context) -> String {
        context.invocation.user.as_ref()
            .and_then(|u| u.role())
            .unwrap_or("anonymous")
            .to_owned()
    }

    #[graphql(name = "Nested")]
    fn nested() -> Nested {
        Nested
    }
}

#[derive(Default)]
struct Nested;

envelope_output!(transparent Nested);

#[enveloped(context = Context)]
impl Nested {
    fn inner(&self) -> Result<i32> {
        Ok(1)
    }
}

envelope_output!(IntOutput => i32);
envelope_output!(StringOutput => String);


type TestRoot = juniper::RootNode<'static, Query, EmptyMutation<Context>, EmptySubscription<Context>>;

fn schema() -> TestRoot {
    TestRoot::new(Query, EmptyMutation::new(), EmptySubscription::new())
}

fn context() -> Context {
    Context::new(Store::builder().build().unwrap(), None)
}

async fn run(query: &str, ctx: &Context) -> juniper::Value {
    let schema = schema();
    let (value, errors) = juniper::execute(query, None, &schema, &Variables::new(), ctx)
        .await
        .unwrap();
    assert!(errors.is_empty(), "unexpected GraphQL errors: {errors:?}");
    value
}


#[tokio::test]
async fn successful_fields() {
    let out = run("{ counted { result error { type } } plain { result error { type } } unit { error { type } } }", &context()).await;
    assert_eq!(out, graphql_value!({
        "counted": { "result": 42, "error": null },
        "plain": { "result": 7, "error": null },
        "unit": { "error": null },
    }));
}

#[tokio::test]
async fn application_error_short_circuits() {
    let ctx = context().with_app_error(StoreError::authentication("jwt malformed"));
    let out = run(
        "{
            guarded { result error { type severity message reasons { path } } }
            Nested { inner { result error { message } } }
            unit { error { type } }
        }",
        &ctx,
    ).await;

    assert_eq!(out, graphql_value!({
        "guarded": {
            "result": null,
            "error": {
                "type": "authentication",
                "severity": "warning",
                "message": "jwt malformed",
                "reasons": null,
            },
        },
        "Nested": { "inner": { "result": null, "error": { "message": "jwt malformed" } } },
        "unit": { "error": { "type": "authentication" } },
    }));
    assert_eq!(GUARDED_CALLS.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn untyped_application_error_is_internal() {
    let ctx = context().with_app_error(anyhow!("body stream broke"));
    let out = run("{ counted { result error { type message } } }", &ctx).await;
    assert_eq!(out, graphql_value!({
        "counted": { "result": null, "error": { "type": "internal", "message": "Internal error" } },
    }));
}

#[tokio::test]
async fn internal_errors_are_hidden() {
    let out = run("{ fails { error { type severity message reasons { path } } } }", &context()).await;
    assert_eq!(out, graphql_value!({
        "fails": {
            "error": {
                "type": "internal",
                "severity": "error",
                "message": "Internal error",
                "reasons": null,
            },
        },
    }));
}

#[tokio::test]
async fn validation_reasons() {
    let out = run("{ invalid { error { type severity message reasons { path message reason } } } }", &context()).await;
    assert_eq!(out, graphql_value!({
        "invalid": {
            "error": {
                "type": "validation",
                "severity": "warning",
                "message": "Validation error",
                "reasons": [
                    { "path": "a", "message": "b", "reason": null },
                    { "path": "input.title", "message": "too long", "reason": "max_length" },
                ],
            },
        },
    }));
}

#[tokio::test]
async fn resolvers_see_user() {
    let out = run("{ whoami { result } }", &context()).await;
    assert_eq!(out, graphql_value!({ "whoami": { "result": "anonymous" } }));

    let mut claims = serde_json::Map::new();
    claims.insert("role".into(), json!("admin"));
    let ctx = Context::new(Store::builder().build().unwrap(), Some(User::from_claims(claims)));
    let out = run("{ whoami { result } }", &ctx).await;
    assert_eq!(out, graphql_value!({ "whoami": { "result": "admin" } }));
}

#[tokio::test]
async fn execute_through_trait_object() {
    let schema: Arc<dyn Schema> = Arc::new(schema());
    let request: GraphQLRequest = serde_json::from_value(json!({
        "query": "query Q { counted { result } }",
        "operationName": "Q",
    })).unwrap();

    let response = schema.execute(&request, &context()).await;
    assert!(response.is_ok());
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({ "data": { "counted": { "result": 42 } } }),
    );
}

#[test]
fn sdl_contains_envelope_types() {
    let sdl = schema().sdl();
    for needle in [
        "enum ErrorType",
        "  notImplemented\n",
        "  authentication\n",
        "enum ErrorSeverity",
        "  warning\n",
        "type ErrorReason",
        "type Error {",
        "type EmptyOutput",
        "type IntOutput",
        "counted: IntOutput!",
    ] {
        assert!(sdl.contains(needle), "SDL does not contain '{needle}':\n{sdl}");
    }
}
