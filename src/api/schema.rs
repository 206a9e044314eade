use futures::{future::BoxFuture, FutureExt};
use juniper::{
    http::{GraphQLRequest, GraphQLResponse},
    DefaultScalarValue, GraphQLSubscriptionType, GraphQLTypeAsync, RootNode,
};

use super::Context;


/// An executable schema using our [`Context`]. This erases the concrete
/// query, mutation and subscription types, so that the HTTP layer does not
/// depend on the application.
pub(crate) trait Schema: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        request: &'a GraphQLRequest,
        context: &'a Context,
    ) -> BoxFuture<'a, GraphQLResponse>;

    /// The schema in GraphQL schema definition language.
    fn sdl(&self) -> String;
}

impl<Q, M, S> Schema for RootNode<'static, Q, M, S>
where
    Q: GraphQLTypeAsync<DefaultScalarValue, Context = Context> + Send + Sync + 'static,
    Q::TypeInfo: Send + Sync,
    M: GraphQLTypeAsync<DefaultScalarValue, Context = Context> + Send + Sync + 'static,
    M::TypeInfo: Send + Sync,
    S: GraphQLSubscriptionType<DefaultScalarValue, Context = Context> + Send + Sync + 'static,
    S::TypeInfo: Send + Sync,
{
    fn execute<'a>(
        &'a self,
        request: &'a GraphQLRequest,
        context: &'a Context,
    ) -> BoxFuture<'a, GraphQLResponse> {
        request.execute(self, context).boxed()
    }

    fn sdl(&self) -> String {
        self.as_sdl()
    }
}
