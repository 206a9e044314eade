//! Small inline modules, so that individual log messages can be filtered out
//! with our filter system, e.g. `store_graphql::http::log::headers = "off"`.

use super::Request;
use crate::prelude::*;


pub(super) mod req {
    use super::*;

    pub(in crate::http) fn log<B>(req: &Request<B>) {
        trace!(
            method = ?req.method(),
            path = req.uri().path_and_query().map_or("", |pq| pq.as_str()),
            "Incoming HTTP request",
        );
    }
}

pub(super) mod headers {
    use std::fmt::Write;

    use super::*;

    pub(in crate::http) fn log<B>(req: &Request<B>) {
        if tracing::enabled!(tracing::Level::TRACE) {
            let mut out = String::new();
            for (name, value) in req.headers() {
                // Writing to a `String` cannot fail.
                let _ = write!(out, "\n  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
            }
            trace!("HTTP Headers: {}", out);
        }
    }
}
