use std::{sync::Arc, time::Instant};

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{body::Body, Method, StatusCode};
use juniper::http::GraphQLRequest;

use crate::{api, auth, prelude::*};
use super::{log, response, Context, Request, Response};


/// This is the main HTTP entry point, called for each incoming request.
pub(super) async fn handle<B>(req: Request<B>, ctx: Arc<Context>) -> Response
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    log::req::log(&req);
    if ctx.log_headers {
        log::headers::log(&req);
    }

    let path = req.uri().path().trim_end_matches('/');
    if path != ctx.api_path {
        debug!("Responding with 404 to {:?} '{}'", req.method(), req.uri().path());
        return response::not_found();
    }

    // The GraphQL endpoint only accepts POST. Preflight requests never reach
    // this point if CORS is enabled.
    if req.method() != Method::POST {
        return response::method_not_allowed();
    }

    handle_api(req, &ctx).await
}

/// Handles a request to the API path.
async fn handle_api<B>(req: Request<B>, ctx: &Context) -> Response
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let before = Instant::now();
    let (parts, body) = req.into_parts();

    // Invalid credentials do not fail the request. Instead, every field of
    // the response reports the error.
    let api_context = match auth::user_from_headers(&parts.headers, ctx.jwt.as_ref()) {
        Ok(user) => {
            trace!("User: {:?}", user);
            api::Context::new(ctx.store.clone(), user)
        }
        Err(e) => {
            debug!("Invalid credentials in API request: {e}");
            api::Context::new(ctx.store.clone(), None).with_app_error(e)
        }
    };

    let body = match Limited::new(body, ctx.max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!("Rejecting API request with body larger than {} bytes", ctx.max_body_size);
            return response::payload_too_large();
        }
        Err(e) => {
            warn!("Failed to read body of API request: {e}");
            return response::bad_request("could not read body");
        }
    };

    let request = match serde_json::from_slice::<GraphQLRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Malformed GraphQL request: {e}");
            return response::bad_request(&format!("invalid GraphQL request: {e}"));
        }
    };

    let out = ctx.schema.execute(&request, &api_context).await;
    let status = if out.is_ok() { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    let body = match serde_json::to_vec(&out) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize GraphQL response: {e}");
            return response::internal_server_error();
        }
    };

    debug!("Finished API request in {:.2?}", before.elapsed());
    response::json(status, body)
}
