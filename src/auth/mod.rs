//! Transport authentication: turning the `Authorization` header of a request
//! into a [`User`].

use hyper::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{err::StoreError, prelude::*};


mod jwt;

pub(crate) use self::jwt::{JwtConfig, JwtContext};


const BAD_FORMAT: &str = "Format is Authorization: Bearer [token]";


/// An authenticated caller. Wraps the claims of the verified token; no claim
/// is required, but `role` and `id` have special meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct User {
    claims: Map<String, Value>,
}

impl User {
    pub(crate) fn from_claims(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// The single role of this user, if the `role` claim is a string.
    pub(crate) fn role(&self) -> Option<&str> {
        self.claim("role")?.as_str()
    }

    pub(crate) fn id(&self) -> Option<&Value> {
        self.claim("id")
    }

    pub(crate) fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub(crate) fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}


/// Determines the caller of a request from its headers.
///
/// No `Authorization` header (or JWT being disabled) means the caller is
/// anonymous. So does a header with a scheme other than `Bearer`, as other
/// credentials are not ours to check. A header that is not of the form
/// `<scheme> <credentials>`, or a bearer token that does not verify, results
/// in an authentication error. That error does not fail the request: it is
/// attached to the API context and reported by every field.
pub(crate) fn user_from_headers(
    headers: &HeaderMap,
    jwt: Option<&JwtContext>,
) -> Result<Option<User>, StoreError> {
    let Some(jwt) = jwt else {
        return Ok(None);
    };
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let (scheme, token) = value.to_str().ok()
        .and_then(|v| {
            let mut parts = v.split(' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(scheme), Some(token), None) => Some((scheme, token)),
                _ => None,
            }
        })
        .ok_or_else(|| StoreError::authentication(BAD_FORMAT))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        trace!("Ignoring 'Authorization' header with scheme '{scheme}'");
        return Ok(None);
    }

    jwt.decode(token)
        .map(Some)
        .map_err(StoreError::authentication)
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hyper::header::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use crate::err::ErrorKind;
    use super::{*, jwt::Algorithm};

    const SECRET: &str = "test-secret";

    fn config() -> JwtConfig {
        JwtConfig {
            secret: Some(SECRET.into()),
            algorithm: Algorithm::HS256,
            audience: None,
            issuer: None,
            leeway: Duration::ZERO,
        }
    }

    fn token(claims: Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    fn message(res: Result<Option<User>, StoreError>) -> String {
        let err = res.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        err.message().to_owned()
    }

    #[test]
    fn anonymous_without_header() {
        let ctx = JwtContext::new(&config()).unwrap();
        assert_eq!(user_from_headers(&HeaderMap::new(), Some(&ctx)).unwrap(), None);
    }

    #[test]
    fn disabled_ignores_header() {
        let disabled = JwtConfig { secret: None, ..config() };
        assert!(JwtContext::new(&disabled).is_none());
        assert_eq!(user_from_headers(&headers("Bearer invalid_token"), None).unwrap(), None);
    }

    #[test]
    fn valid_token() {
        let ctx = JwtContext::new(&config()).unwrap();
        let t = token(json!({ "id": 2, "role": "admin" }), SECRET);
        let user = user_from_headers(&headers(&format!("Bearer {t}")), Some(&ctx))
            .unwrap()
            .unwrap();
        assert_eq!(user.role(), Some("admin"));
        assert_eq!(user.id(), Some(&json!(2)));
        assert_eq!(user.claim("missing"), None);

        // The scheme is case insensitive.
        assert!(user_from_headers(&headers(&format!("bearer {t}")), Some(&ctx)).is_ok());
    }

    #[test]
    fn bad_format() {
        let ctx = JwtContext::new(&config()).unwrap();
        for value in ["Bearer", "token", "Bearer a b", "Basic a b", ""] {
            assert_eq!(message(user_from_headers(&headers(value), Some(&ctx))), BAD_FORMAT);
        }
    }

    #[test]
    fn other_schemes_are_anonymous() {
        let ctx = JwtContext::new(&config()).unwrap();
        for value in ["Basic dXNlcjpwYXNz", "Token abc", "Digest x"] {
            assert_eq!(user_from_headers(&headers(value), Some(&ctx)).unwrap(), None);
        }
    }

    #[test]
    fn invalid_tokens() {
        let ctx = JwtContext::new(&config()).unwrap();
        let check = |t: &str| message(user_from_headers(&headers(&format!("Bearer {t}")), Some(&ctx)));

        assert_eq!(check("invalid_token"), "jwt malformed");
        assert_eq!(check(&token(json!({ "id": 1 }), "other-secret")), "invalid signature");
        assert_eq!(check(&token(json!({ "id": 1, "exp": 1000 }), SECRET)), "jwt expired");

        let in_future = chrono::Utc::now().timestamp() + 3600;
        assert_eq!(check(&token(json!({ "nbf": in_future }), SECRET)), "jwt not active");

        let hs512 = encode(
            &Header::new(jsonwebtoken::Algorithm::HS512),
            &json!({ "id": 1 }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        ).unwrap();
        assert_eq!(check(&hs512), "invalid algorithm");
    }

    #[test]
    fn audience_and_issuer() {
        let config = JwtConfig {
            audience: Some("api".into()),
            issuer: Some("auth-server".into()),
            ..config()
        };
        let ctx = JwtContext::new(&config).unwrap();
        let check = |claims| user_from_headers(&headers(&format!("Bearer {}", token(claims, SECRET))), Some(&ctx));

        assert!(check(json!({ "aud": "api", "iss": "auth-server" })).unwrap().is_some());
        assert_eq!(message(check(json!({ "aud": "web", "iss": "auth-server" }))), "jwt audience invalid");
        assert_eq!(message(check(json!({ "aud": "api", "iss": "evil" }))), "jwt issuer invalid");
    }
}
