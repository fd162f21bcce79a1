//! HTTP strategy: performs the request described by an HTTP template.
//!
//! Header values sourced from secrets are looked up on every call, never
//! cached, so rotated credentials take effect on the next request. The
//! response body becomes the node's single `result` output parameter.

use crate::{Execution, ExecutionStrategy};
use async_trait::async_trait;
use flowhand_core::error::ExecutionError;
use flowhand_core::node::{NodeResult, Outputs, Parameter};
use flowhand_core::store::SecretStore;
use flowhand_core::template::{HttpTemplate, Template};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct HttpStrategy {
    client: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    namespace: String,
}

impl HttpStrategy {
    /// Create a strategy resolving secrets in `namespace`.
    pub fn new(secrets: Arc<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secrets,
            namespace: namespace.into(),
        }
    }

    /// Resolve every header to its literal value.
    async fn resolve_headers(
        &self,
        http: &HttpTemplate,
    ) -> Result<Vec<(String, String)>, ExecutionError> {
        let mut headers = Vec::with_capacity(http.headers.len());
        for header in &http.headers {
            let value = match header.secret_ref() {
                Some(secret) => {
                    debug!(header = %header.name, secret = %secret.name, "Resolving header from secret");
                    let bytes = self
                        .secrets
                        .get_secret(&self.namespace, &secret.name, &secret.key)
                        .await
                        .map_err(|e| ExecutionError::Secret {
                            name: secret.name.clone(),
                            key: secret.key.clone(),
                            reason: e.to_string(),
                        })?;
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                None => header.value.clone(),
            };
            headers.push((header.name.clone(), value));
        }
        Ok(headers)
    }
}

#[async_trait]
impl ExecutionStrategy for HttpStrategy {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, template: &Template) -> Result<Execution, ExecutionError> {
        let http = template
            .http
            .as_ref()
            .ok_or_else(|| ExecutionError::InvalidTemplate("template has no http section".into()))?;

        let headers = self.resolve_headers(http).await?;
        let timeout = http.timeout_seconds.map(Duration::from_secs);
        let body = send_http_request(&self.client, http, &headers, timeout).await?;

        Ok(Execution::done(NodeResult::succeeded(Some(Outputs {
            parameters: vec![Parameter::new("result", body)],
        }))))
    }
}

/// Send the request and return the response body verbatim.
///
/// Responses with a status of 400 or above are errors.
pub async fn send_http_request(
    client: &reqwest::Client,
    http: &HttpTemplate,
    headers: &[(String, String)],
    timeout: Option<Duration>,
) -> Result<String, ExecutionError> {
    let method = reqwest::Method::from_bytes(http.method.to_uppercase().as_bytes())
        .map_err(|_| ExecutionError::InvalidTemplate(format!("invalid HTTP method: {}", http.method)))?;

    let mut request = client.request(method.clone(), &http.url);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if !http.body.is_empty() {
        request = request.body(http.body.clone());
    }
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ExecutionError::Http(format!(
                "{method} {} timed out after {}s",
                http.url,
                timeout.unwrap_or_default().as_secs()
            ))
        } else {
            ExecutionError::Http(e.to_string())
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExecutionError::Http(format!("failed to read response body: {e}")))?;

    info!(method = %method, url = %http.url, status = status.as_u16(), "HTTP request sent");

    if status.as_u16() >= 400 {
        return Err(ExecutionError::Http(format!(
            "received non-2XX response code {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )));
    }

    Ok(body)
}
