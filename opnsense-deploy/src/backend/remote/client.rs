// HTTP plumbing for the remote management API: client construction, URL building,
// verb helpers and status/body classification into `ConfigError`.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, Result};
use crate::model::ResourceKind;
use crate::settings::RemoteSettings;

/// Resource a keyed call addresses, used to turn a 404 into `NotFound`.
pub(crate) type Target<'a> = Option<(ResourceKind, &'a str)>;

pub(crate) struct ApiClient {
    http: Client,
    base: Url,
    key: String,
    secret: SecretString,
}

/// Ensure the base URL ends with `/` and can carry path segments.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::validation("api_url", format!("'{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::validation(
            "api_url",
            format!("'{raw}' cannot carry a request path"),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Append `segments` below `base`, each one percent-encoded as a single path segment.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let unusable = |s: &str| s.is_empty() || s == "." || s == ".." || s.chars().any(char::is_control);
    if let Some(bad) = segments.iter().find(|s| unusable(s)) {
        return Err(ConfigError::validation(
            "path",
            format!("'{bad}' is not a usable path segment"),
        ));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| {
            ConfigError::validation("api_url", format!("'{base}' cannot carry a request path"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl ApiClient {
    pub(crate) fn new(settings: &RemoteSettings) -> Result<Self> {
        let base = normalize_base_url(&settings.url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("opnsense-deploy/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|e| {
                ConfigError::BackendUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            base,
            key: settings.key.clone(),
            secret: settings.secret.clone(),
        })
    }

    fn url(&self, path: &[&str]) -> Result<Url> {
        endpoint(&self.base, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.key, Some(self.secret.expose_secret()))
    }

    pub(crate) fn get(&self, path: &[&str], target: Target<'_>) -> Result<Value> {
        let url = self.url(path)?;
        debug!("GET {url}");
        let resp = self.authed(self.http.get(url)).send().map_err(transport)?;
        parse_response(resp, target)
    }

    pub(crate) fn post(&self, path: &[&str], body: &Value) -> Result<Value> {
        let url = self.url(path)?;
        debug!("POST {url}");
        let resp = self
            .authed(self.http.post(url))
            .json(body)
            .send()
            .map_err(transport)?;
        parse_response(resp, None)
    }

    pub(crate) fn put(&self, path: &[&str], body: &Value, target: Target<'_>) -> Result<Value> {
        let url = self.url(path)?;
        debug!("PUT {url}");
        let resp = self
            .authed(self.http.put(url))
            .json(body)
            .send()
            .map_err(transport)?;
        parse_response(resp, target)
    }

    pub(crate) fn delete(&self, path: &[&str], target: Target<'_>) -> Result<Value> {
        let url = self.url(path)?;
        debug!("DELETE {url}");
        let resp = self
            .authed(self.http.delete(url))
            .send()
            .map_err(transport)?;
        parse_response(resp, target)
    }
}

fn transport(err: reqwest::Error) -> ConfigError {
    if err.is_timeout() {
        ConfigError::BackendUnavailable(format!("request timed out: {err}"))
    } else {
        ConfigError::BackendUnavailable(err.to_string())
    }
}

/// Message the remote attached to a failure, else the raw body.
fn remote_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error", "status"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn parse_response(resp: Response, target: Target<'_>) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().map_err(transport)?;

    if status == StatusCode::NOT_FOUND {
        if let Some((kind, key)) = target {
            return Err(ConfigError::not_found(kind, key));
        }
    }
    if !status.is_success() {
        let message = remote_message(&body);
        return Err(ConfigError::RemoteRejected {
            message: if message.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {message}")
            },
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| ConfigError::RemoteRejected {
        message: format!("unreadable response ({e}): {body}"),
    })
}

/// Require `{"result": expected}`; anything else is a rejection carrying the remote message.
pub(crate) fn expect_result(resp: &Value, expected: &str) -> Result<()> {
    match resp.get("result").and_then(Value::as_str) {
        Some(result) if result == expected => Ok(()),
        _ => Err(ConfigError::RemoteRejected {
            message: resp
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| resp.to_string()),
        }),
    }
}
