use std::time::Duration;

use hyper::{header::{self, HeaderValue}, Method, Request};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::prelude::*;


#[derive(Debug, Clone, confique::Config)]
pub(crate) struct CorsConfig {
    /// Whether to answer CORS preflight requests and add CORS headers to
    /// responses of the API path. Any `OPTIONS` request to that path is
    /// treated as preflight. If `false`, `OPTIONS` requests are answered
    /// with 405.
    #[config(default = false)]
    pub(crate) enabled: bool,

    /// Origins that may access the API. The special value "*" allows any
    /// origin. Example: ["https://example.com", "https://admin.example.com"].
    #[config(default = ["*"])]
    pub(crate) allowed_origins: Vec<String>,

    /// HTTP methods announced in preflight responses.
    #[config(default = ["POST"])]
    pub(crate) allowed_methods: Vec<String>,

    /// How long browsers may cache preflight responses. "0s" omits the
    /// `Access-Control-Max-Age` header.
    #[config(default = "0s", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) max_age: Duration,
}

impl CorsConfig {
    /// Returns the CORS middleware or `None` if CORS is disabled. Fails for
    /// invalid origins or method names.
    pub(crate) fn layer(&self) -> Result<Option<CorsLayer>> {
        if !self.enabled {
            return Ok(None);
        }

        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            self.allowed_origins.iter()
                .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid origin '{o}'")))
                .collect::<Result<Vec<_>>>()?
                .pipe(AllowOrigin::list)
        };

        let methods = self.allowed_methods.iter()
            .map(|m| {
                Method::from_bytes(m.trim().as_bytes())
                    .with_context(|| format!("invalid HTTP method '{m}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut layer = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(AllowHeaders::mirror_request());
        if !self.max_age.is_zero() {
            layer = layer.max_age(self.max_age);
        }

        Ok(Some(layer))
    }
}

/// Turns a plain `OPTIONS` request into a preflight request, so that it is
/// answered with the allowed methods as well.
pub(super) fn as_preflight<B>(mut req: Request<B>) -> Request<B> {
    if req.method() == Method::OPTIONS
        && !req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    {
        req.headers_mut().insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        );
    }
    req
}
