//! Shared HTTP plumbing: client construction, cookie headers and JSON calls.

use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Client, RequestBuilder};
use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use std::sync::Once;
use tracing::{debug, trace};

use crate::config::PlatformConfig;
use crate::error::Result;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0";

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the process-wide rustls provider used by reqwest and tungstenite.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }
    });
}

pub fn default_client(config: &PlatformConfig) -> Result<Client> {
    ensure_crypto_provider();
    let client = Client::builder()
        .use_rustls_tls()
        .user_agent(config.user_agent())
        .timeout(config.request_timeout())
        .build()?;
    Ok(client)
}

/// Send a request and decode the JSON body. Non-2xx statuses become `Http` errors.
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?.error_for_status()?;
    trace!(url = %response.url(), status = %response.status(), "Upstream response");
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

pub async fn send_text(request: RequestBuilder) -> Result<String> {
    let response = request.send().await?.error_for_status()?;
    Ok(response.text().await?)
}

pub fn parse_cookie_header(input: &str) -> Vec<(String, String)> {
    input
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }

            let (name, value) = part.split_once('=')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return None;
            }

            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    parse_cookie_header(cookies)
        .into_iter()
        .find_map(|(k, v)| (k == name).then_some(v))
}

/// Merge two cookie headers. Keys present in `preferred` win; `fallback`
/// only fills in keys that are missing.
pub fn merge_cookie_headers(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    let preferred = preferred.map(str::trim).filter(|s| !s.is_empty());
    let fallback = fallback.map(str::trim).filter(|s| !s.is_empty());

    match (preferred, fallback) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
        (Some(preferred), Some(fallback)) => {
            let mut parts = parse_cookie_header(preferred);
            let mut seen: FxHashSet<String> = parts.iter().map(|(k, _)| k.clone()).collect();

            for (name, value) in parse_cookie_header(fallback) {
                if seen.insert(name.clone()) {
                    parts.push((name, value));
                }
            }

            Some(
                parts
                    .into_iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }
}

/// Value of a cookie set by the response, e.g. a freshly issued `ttwid`.
pub fn set_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == name && !v.trim().is_empty()).then(|| v.trim().to_string())
        })
}
