//! The demo application served by the binary: a tiny "posts" API that uses
//! every feature of the store and the GraphQL layer.

use chrono::Utc;
use juniper::{EmptyMutation, EmptySubscription, GraphQLObject};
use serde_json::json;
use store_graphql_macros::enveloped;

use crate::{
    api::{envelope::envelope_output, scalars::{Date, DateTime, Json, Time}, Context},
    prelude::*,
    store::{Store, StoreConfig},
};
use self::posts::PostQuery;


mod posts;



pub(crate) type RootNode = juniper::RootNode<
    'static,
    Query,
    EmptyMutation<Context>,
    EmptySubscription<Context>,
>;

pub(crate) fn root_node() -> RootNode {
    RootNode::new(Query, EmptyMutation::new(), EmptySubscription::new())
}

/// Registers all store methods of the application.
pub(crate) fn store(config: &StoreConfig) -> Result<Store> {
    let mut builder = Store::builder();
    builder
        .method_context(posts::defaults())
        .configure(config)
        .layer(posts::TrimTitle);
    builder.scope("api", |api| {
        api.scope("posts", posts::define);
    });
    builder.build()
}


pub(crate) struct Query;

#[enveloped(context = Context)]
impl Query {
    #[graphql(name = "Post")]
    fn post() -> PostQuery {
        PostQuery
    }

    /// Returns fixed values of all built-in scalar types.
    fn test() -> TestResult {
        let epoch = chrono::DateTime::<Utc>::UNIX_EPOCH;
        TestResult {
            json: Json(json!({ "a": { "b": { "c": 1 } } })),
            date_time: epoch.into(),
            date: epoch.into(),
            time: epoch.into(),
        }
    }

    /// Does nothing and never fails.
    fn empty() {}
}

#[derive(Debug, GraphQLObject)]
pub(crate) struct TestResult {
    json: Json,
    date_time: DateTime,
    date: Date,
    time: Time,
}

envelope_output!(TestOutput => TestResult);
