//! Local upstream invocation.
//!
//! # Responsibilities
//! - Guard against proxying targets that are not the local machine
//! - Replay a framed request against the upstream service
//! - Flatten the upstream's answer back into a response frame

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Method;
use url::Url;

use crate::client::relay::ClientError;
use crate::codec::{self, Request, Response};

/// Parse and vet the upstream url. Non-local hosts are refused unless the
/// operator explicitly opted in.
pub fn validate_upstream(upstream_url: &str, allow_external: bool) -> Result<Url, ClientError> {
    let url = Url::parse(upstream_url)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url.host_str().unwrap_or_default();
    let is_local = host == "localhost" || host.starts_with("127.0.0.1");

    if !is_local && !allow_external {
        return Err(ClientError::RemoteUpstreamRefused);
    }

    Ok(url)
}

/// Call the upstream with a framed request and flatten the result.
pub async fn call(
    http: &reqwest::Client,
    base_url: &Url,
    request: &Request,
) -> Result<Response, ClientError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| ClientError::InvalidMethod(request.method.clone()))?;
    let url = base_url.join(&request.path)?;

    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        headers.insert(name, value);
    }

    let cookies = request.cookies.trim_end_matches([' ', ';']);
    if !cookies.is_empty() {
        if let Ok(value) = HeaderValue::from_str(cookies) {
            headers.insert(COOKIE, value);
        }
    }

    let upstream_response = http
        .request(method, url)
        .headers(headers)
        .body(request.body.clone())
        .send()
        .await?;

    let status_code = upstream_response.status().as_u16() as i32;
    let response_headers = flatten_headers(upstream_response.headers());
    let timestamp = codec::now_millis();
    let body = upstream_response.bytes().await?;

    Ok(Response {
        id: request.id.clone(),
        status_code,
        body: body.to_vec(),
        headers: response_headers,
        timestamp,
    })
}

/// Synthesized answer for a failed upstream call; the tunnel stays up.
pub fn bad_gateway(request: &Request, error: &ClientError) -> Response {
    Response {
        id: request.id.clone(),
        status_code: 502,
        body: format!("upstream call failed: {error}").into_bytes(),
        headers: HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]),
        timestamp: codec::now_millis(),
    }
}

/// Comma-join repeated header values under one name. The body has already
/// been read whole, so transport framing headers are dropped.
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();

    for name in headers.keys() {
        if name.as_str() == "transfer-encoding" {
            continue;
        }

        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }

        out.insert(name.as_str().to_string(), values.join(","));
    }

    out
}
