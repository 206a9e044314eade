use futures::future::BoxFuture;
use juniper::{GraphQLInputObject, GraphQLObject};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use store_graphql_macros::enveloped;

use crate::{
    api::{envelope::envelope_output, Context},
    err::{Severity, StoreError},
    prelude::*,
    store::{
        Auth, AuthArgs, Call, MethodContext, Middleware, Next, PredicateResult, Requirement,
        StoreBuilder,
    },
};


/// The only post that "exists". There is no database behind this demo.
const FIXTURE_ID: i32 = 1;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, GraphQLObject)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Post {
    pub(crate) id: i32,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) user_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, GraphQLInputObject)]
pub(crate) struct PostCreateInput {
    pub(crate) title: String,
    pub(crate) content: String,
}

#[derive(Debug, GraphQLObject)]
pub(crate) struct PostCreateResult {
    post: Post,
}

envelope_output!(PostCreateOutput => PostCreateResult);

#[derive(Debug, Clone, Serialize, Deserialize, GraphQLInputObject)]
pub(crate) struct PostUpdateInput {
    pub(crate) id: i32,
    pub(crate) title: String,
    pub(crate) content: String,
    /// Publishing requires the role `admin` or `editor`.
    pub(crate) publish: Option<bool>,
}

#[derive(Debug, GraphQLObject)]
pub(crate) struct PostUpdateResult {
    post: Post,
    published: bool,
}

envelope_output!(PostUpdateOutput => PostUpdateResult);

#[derive(Debug, Serialize, Deserialize)]
struct PostId {
    id: i32,
}


/// Namespace for everything related to posts.
#[derive(Default)]
pub(crate) struct PostQuery;

envelope_output!(transparent PostQuery);

#[enveloped(context = Context)]
impl PostQuery {
    async fn create(&self, input: PostCreateInput, context: &Context) -> Result<PostCreateResult> {
        let post = context.dispatch("api/posts/create", input).await?;
        Ok(PostCreateResult { post })
    }

    async fn update(&self, input: PostUpdateInput, context: &Context) -> Result<PostUpdateResult> {
        let published = input.publish.unwrap_or(false);
        let post = context.dispatch("api/posts/update", input).await?;
        Ok(PostUpdateResult { post, published })
    }

    fn throw_custom_error(&self) -> Result<()> {
        bail!("test")
    }

    fn throw_validation_error(&self) -> Result<()> {
        Err(StoreError::validation("Validation error").add_reason("a", "b").into())
    }
}


/// Default values of the method context, overridable in the configuration
/// file.
pub(super) fn defaults() -> Map<String, Value> {
    Map::from_iter([("maxTitleLength".to_owned(), json!(200))])
}

/// Store methods below `api/posts`.
pub(super) fn define(store: &mut StoreBuilder) {
    store.define("create", Auth::role("admin"), create);
    store.define("get", Auth::authenticated(), get);
    store.define("update", Auth::dynamic(update_auth), update);
}

async fn create(input: PostCreateInput, cx: MethodContext) -> Result<Post> {
    check_title(&input.title, &cx)?;

    let user_id = cx.user()
        .and_then(|user| user.id())
        .and_then(|id| id.as_i64())
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| {
            StoreError::authentication("Token does not contain a numeric user id")
                .with_severity(Severity::Failure)
        })?;

    debug!(cid = %cx.cid, user_id, "Creating post '{}'", input.title);
    Ok(Post {
        id: FIXTURE_ID,
        title: input.title,
        content: input.content,
        user_id,
    })
}

async fn get(PostId { id }: PostId, _: MethodContext) -> Result<Post> {
    if id != FIXTURE_ID {
        return Err(StoreError::not_found(format!("Post {id} does not exist")).into());
    }

    Ok(Post {
        id,
        title: "Hello".into(),
        content: "World".into(),
        user_id: 2,
    })
}

/// Editing needs a login, publishing needs a privileged role.
async fn update_auth(args: AuthArgs) -> PredicateResult {
    let publish = args.payload.get("publish").and_then(Value::as_bool).unwrap_or(false);
    Ok(publish.then(|| Requirement::roles(["admin", "editor"])))
}

async fn update(input: PostUpdateInput, cx: MethodContext) -> Result<Post> {
    check_title(&input.title, &cx)?;
    let post: Post = cx.dispatch("api/posts/get", PostId { id: input.id }).await?;

    debug!(cid = %cx.cid, post = post.id, publish = ?input.publish, "Updating post");
    Ok(Post {
        title: input.title,
        content: input.content,
        ..post
    })
}

fn check_title(title: &str, cx: &MethodContext) -> Result<(), StoreError> {
    if title.is_empty() {
        return Err(StoreError::validation("Invalid post").add_reason("title", "must not be empty"));
    }

    let max = cx.get("maxTitleLength").and_then(Value::as_u64);
    if let Some(max) = max.filter(|&max| title.chars().count() as u64 > max) {
        return Err(StoreError::validation("Invalid post").add_coded_reason(
            "title",
            format!("must not be longer than {max} characters"),
            "max_length",
        ));
    }

    Ok(())
}


/// Strips surrounding whitespace from the `title` of post payloads before the
/// methods validate it.
pub(super) struct TrimTitle;

impl Middleware for TrimTitle {
    fn call<'a>(&'a self, mut payload: Value, call: &'a Call, next: Next<'a>) -> BoxFuture<'a, Result<Value>> {
        if call.name().starts_with("api/posts/") {
            if let Some(Value::String(title)) = payload.get_mut("title") {
                *title = title.trim().to_owned();
            }
        }
        next.run(payload)
    }
}
