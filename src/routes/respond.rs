//! Shared response and request helpers for route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::server::AppState;
use crate::types::{GranaryError, Result};

/// Build a JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(payload)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)))
                .unwrap()
        })
}

/// Error body shape: `{ error, code, hint? }`
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

/// Build a JSON error response from a domain error
pub fn error_response(err: &GranaryError) -> Response<Full<Bytes>> {
    json_response(
        err.status_code(),
        &ErrorBody {
            error: err.to_string(),
            code: err.error_code(),
            hint: err.hint(),
        },
    )
}

/// Read and deserialize a JSON request body
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| GranaryError::BadRequest(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&body)
        .map_err(|e| GranaryError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Like [`read_json`], but an empty body yields the type's default.
/// Admin endpoints whose whole body is optional flags use this.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(
    req: Request<Incoming>,
) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| GranaryError::BadRequest(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&body)
        .map_err(|e| GranaryError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Parse query string into key-value map
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    if query.is_empty() {
        return HashMap::new();
    }

    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Caller identity from the `X-User-Id` header
///
/// Session authentication lives at the platform edge; it injects the
/// resolved user id before requests reach granary.
pub fn require_user(user_id: Option<&str>) -> Result<&str> {
    user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GranaryError::Unauthorized("missing X-User-Id".into()))
}

/// Admin gate via the `X-Admin-Key` header. Dev mode waives the check.
pub fn require_admin(state: &AppState, admin_key: Option<&str>) -> Result<()> {
    if state.args.dev_mode {
        return Ok(());
    }

    let expected = state
        .args
        .api_key_admin
        .as_deref()
        .ok_or_else(|| GranaryError::Config("admin API key not configured".into()))?;

    match admin_key {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(GranaryError::Forbidden("invalid admin key".into())),
        None => Err(GranaryError::Unauthorized("missing X-Admin-Key".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("days=30&limit=10");
        assert_eq!(params.get("days"), Some(&"30".to_string()));
        assert_eq!(params.get("limit"), Some(&"10".to_string()));
    }

    #[test]
    fn test_parse_query_params_empty() {
        assert!(parse_query_params("").is_empty());
    }

    #[test]
    fn test_require_user() {
        assert_eq!(require_user(Some("user-1")).unwrap(), "user-1");
        assert!(require_user(None).is_err());
        assert!(require_user(Some("")).is_err());
    }

    #[test]
    fn test_error_response_carries_code_and_hint() {
        let err = GranaryError::InsufficientBalance {
            required: 15,
            available: 5,
        };
        let resp = error_response(&err);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
