//! Kubernetes REST backend.
//!
//! Task sets are `argoproj.io/v1alpha1` `workflowtasksets`. The watch is a
//! long-lived GET streamed as newline-delimited JSON; updates are JSON merge
//! patches; secrets are read through the core v1 API.

use async_trait::async_trait;
use base64::Engine;
use flowhand_config::KubeConfig;
use flowhand_core::error::StoreError;
use flowhand_core::store::{SecretStore, TaskSetStore, WatchStream};
use flowhand_core::taskset::{ApiStatus, WatchEvent, WorkflowTaskSet};
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const TASK_SET_KIND: &str = "WorkflowTaskSet";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A task-set store backed by the Kubernetes API server.
pub struct KubeStore {
    api_url: String,
    namespace: String,
    token_path: Option<PathBuf>,
    /// Short requests: patches and secret reads
    client: reqwest::Client,
    /// Watches stay open indefinitely and must not carry a request timeout
    watch_client: reqwest::Client,
}

impl KubeStore {
    /// Create a store without authentication or a custom CA.
    pub fn new(api_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token_path: None,
            client: reqwest::Client::new(),
            watch_client: reqwest::Client::new(),
        }
    }

    /// Create a store from the `[kube]` config section.
    ///
    /// A configured CA bundle that does not exist is skipped, so the same
    /// config works inside and outside a cluster.
    pub fn from_config(
        config: &KubeConfig,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        let mut watch_client = reqwest::Client::builder();

        if let Some(ca_path) = config.ca_path.as_ref().filter(|p| p.exists()) {
            let pem = std::fs::read(ca_path).map_err(|e| {
                StoreError::Network(format!("failed to read CA bundle {}: {e}", ca_path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                StoreError::Network(format!("invalid CA bundle {}: {e}", ca_path.display()))
            })?;
            client = client.add_root_certificate(cert.clone());
            watch_client = watch_client.add_root_certificate(cert);
            debug!(path = %ca_path.display(), "Loaded API server CA bundle");
        }

        let build = |b: reqwest::ClientBuilder| {
            b.build()
                .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token_path: config.token_path.clone(),
            client: build(client)?,
            watch_client: build(watch_client)?,
        })
    }

    /// Authenticate with the bearer token in `path`.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    fn task_sets_url(&self) -> String {
        format!(
            "{}/apis/argoproj.io/v1alpha1/namespaces/{}/workflowtasksets",
            self.api_url, self.namespace
        )
    }

    /// Read the bearer token. A missing file means no authentication.
    async fn token(&self) -> Option<String> {
        let path = self.token_path.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read API token");
                None
            }
        }
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TaskSetStore for KubeStore {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn watch(&self, task_set: &str) -> Result<WatchStream, StoreError> {
        let selector = format!("metadata.name={task_set}");
        let request = self
            .watch_client
            .get(self.task_sets_url())
            .query(&[("watch", "true"), ("fieldSelector", selector.as_str())]);
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        info!(task_set, namespace = %self.namespace, "Watching task set");
        Ok(decode_watch_lines(response.bytes_stream()))
    }

    async fn merge_patch(
        &self,
        task_set: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let body =
            serde_json::to_vec(patch).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let request = self
            .client
            .patch(format!("{}/{task_set}", self.task_sets_url()))
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .body(body);

        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        trace!(task_set, "Merge patch accepted");
        Ok(())
    }
}

#[derive(Deserialize)]
struct SecretObject {
    #[serde(default)]
    data: HashMap<String, String>,
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/api/v1/namespaces/{namespace}/secrets/{name}", self.api_url);
        let response = self
            .authorize(self.client.get(url))
            .await
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("secret {namespace}/{name}")));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let secret: SecretObject = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let encoded = secret
            .data
            .get(key)
            .ok_or_else(|| StoreError::NotFound(format!("key {key} in secret {namespace}/{name}")))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| StoreError::Serialization(format!("secret {name}/{key} is not base64: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Network(e.to_string())
    }
}

/// Turn a non-2xx response into an API error, using the server's `Status`
/// object when it sent one.
async fn api_error(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiStatus>(&text) {
        Ok(s) if !s.reason.is_empty() || !s.message.is_empty() => StoreError::Api {
            status_code: status.as_u16(),
            reason: s.reason,
            message: s.message,
        },
        _ => StoreError::Api {
            status_code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            message: text,
        },
    }
}

#[derive(Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: serde_json::Value,
}

/// Decode one watch line. `Ok(None)` for events the agent ignores.
fn decode_event(line: &[u8]) -> Result<Option<WatchEvent>, StoreError> {
    let raw: RawWatchEvent = serde_json::from_slice(line)
        .map_err(|e| StoreError::MalformedEvent(format!("undecodable watch line: {e}")))?;

    let task_set = |object: serde_json::Value| -> Result<WorkflowTaskSet, StoreError> {
        let ts: WorkflowTaskSet = serde_json::from_value(object).map_err(|e| {
            StoreError::MalformedEvent(format!("{} object is not a task set: {e}", raw.event_type))
        })?;
        match ts.kind.as_deref() {
            None | Some(TASK_SET_KIND) => Ok(ts),
            Some(other) => Err(StoreError::MalformedEvent(format!(
                "{} object has kind {other}, expected {TASK_SET_KIND}",
                raw.event_type
            ))),
        }
    };

    match raw.event_type.as_str() {
        "ADDED" => Ok(Some(WatchEvent::Added(task_set(raw.object)?))),
        "MODIFIED" => Ok(Some(WatchEvent::Modified(task_set(raw.object)?))),
        "DELETED" => Ok(Some(WatchEvent::Deleted)),
        "BOOKMARK" => Ok(None),
        "ERROR" => {
            let status: ApiStatus = serde_json::from_value(raw.object)
                .map_err(|e| StoreError::MalformedEvent(format!("undecodable ERROR event: {e}")))?;
            Ok(Some(WatchEvent::Error(status)))
        }
        other => Err(StoreError::MalformedEvent(format!(
            "unknown watch event type {other}"
        ))),
    }
}

struct LineReader<S> {
    body: std::pin::Pin<Box<S>>,
    buf: Vec<u8>,
    eof: bool,
}

impl<S> LineReader<S> {
    /// Pop the next complete line, or the trailing fragment once the body
    /// has ended.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            return Some(line);
        }
        if self.eof && !self.buf.is_empty() {
            return Some(std::mem::take(&mut self.buf));
        }
        None
    }
}

/// Split a chunked body into lines and decode each as a watch event.
///
/// A transport error ends the stream; it is not an event error, and the
/// caller re-subscribes.
pub fn decode_watch_lines<S, B, E>(body: S) -> WatchStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let reader = LineReader {
        body: Box::pin(body),
        buf: Vec::new(),
        eof: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(line) = reader.next_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match decode_event(&line) {
                    Ok(Some(event)) => return Some((Ok(event), reader)),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), reader)),
                }
            }
            if reader.eof {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    debug!(error = %e, "Watch stream interrupted");
                    return None;
                }
                None => reader.eof = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    const ADDED: &str = r#"{"type":"ADDED","object":{"kind":"WorkflowTaskSet","metadata":{"name":"wf"},"spec":{"tasks":{"n1":{"http":{"url":"http://x"}}}}}}"#;

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let (head, tail) = ADDED.split_at(40);
        let events: Vec<_> = decode_watch_lines(chunks(&[
            head,
            tail,
            "\n{\"type\":\"BOOKMARK\",\"object\":{}}\n\n",
            "{\"type\":\"DELETED\",\"object\":{}}",
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            Ok(WatchEvent::Added(ts)) => {
                assert_eq!(ts.metadata.name, "wf");
                assert!(ts.spec.tasks.contains_key("n1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events[1], Ok(WatchEvent::Deleted)));
    }

    #[tokio::test]
    async fn error_event_carries_status() {
        let line = r#"{"type":"ERROR","object":{"kind":"Status","code":410,"reason":"Expired","message":"too old resource version"}}"#;
        let events: Vec<_> = decode_watch_lines(chunks(&[line])).collect().await;
        match &events[0] {
            Ok(WatchEvent::Error(status)) => {
                assert_eq!(status.code, 410);
                assert_eq!(status.reason, "Expired");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_and_foreign_objects_are_malformed() {
        let foreign = r#"{"type":"MODIFIED","object":{"kind":"Status","message":"nope"}}"#;
        let events: Vec<_> = decode_watch_lines(chunks(&["not json\n", foreign]))
            .collect()
            .await;
        assert!(matches!(events[0], Err(StoreError::MalformedEvent(_))));
        assert!(matches!(events[1], Err(StoreError::MalformedEvent(_))));
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let body = stream::iter(vec![
            Ok(format!("{ADDED}\n").into_bytes()),
            Err("connection reset".to_string()),
            Ok(b"{\"type\":\"DELETED\",\"object\":{}}\n".to_vec()),
        ]);
        let events: Vec<_> = decode_watch_lines(body).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(WatchEvent::Added(_))));
    }

    #[tokio::test]
    async fn watch_sends_field_selector_and_token() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen_in = seen.clone();
        let router = Router::new().route(
            "/apis/argoproj.io/v1alpha1/namespaces/{ns}/workflowtasksets",
            get(
                move |Path(ns): Path<String>,
                      Query(q): Query<HashMap<String, String>>,
                      headers: HeaderMap| {
                    let seen = seen_in.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        seen.lock().unwrap().push(format!(
                            "{ns} {} {} {auth}",
                            q.get("watch").cloned().unwrap_or_default(),
                            q.get("fieldSelector").cloned().unwrap_or_default(),
                        ));
                        format!("{ADDED}\n")
                    }
                },
            ),
        );
        let base = serve(router).await;
        let mut token = tempfile::NamedTempFile::new().unwrap();
        writeln!(token, "tok").unwrap();

        let store = KubeStore::new(base, "argo").with_token_path(token.path());
        let events: Vec<_> = store.watch("wf").await.unwrap().collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["argo true metadata.name=wf Bearer tok"]
        );
    }

    #[tokio::test]
    async fn patch_uses_merge_content_type_and_decodes_status() {
        let router = Router::new().route(
            "/apis/argoproj.io/v1alpha1/namespaces/{ns}/workflowtasksets/{name}",
            patch(
                |Path((_ns, name)): Path<(String, String)>,
                 headers: HeaderMap,
                 Json(body): Json<serde_json::Value>| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if content_type != "application/merge-patch+json" {
                        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, Json(serde_json::json!({})));
                    }
                    if name == "conflicted" {
                        return (
                            StatusCode::CONFLICT,
                            Json(serde_json::json!({
                                "kind": "Status",
                                "code": 409,
                                "reason": "Conflict",
                                "message": "the object has been modified",
                            })),
                        );
                    }
                    (StatusCode::OK, Json(body))
                },
            ),
        );
        let base = serve(router).await;
        let store = KubeStore::new(base, "argo");
        let patch = serde_json::json!({"status": {"nodes": {"n1": {"phase": "Succeeded"}}}});

        store.merge_patch("wf", &patch).await.unwrap();

        let err = store.merge_patch("conflicted", &patch).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("the object has been modified"));
    }

    #[tokio::test]
    async fn secret_is_base64_decoded() {
        let router = Router::new().route(
            "/api/v1/namespaces/{ns}/secrets/{name}",
            get(|Path((_ns, name)): Path<(String, String)>| async move {
                if name != "creds" {
                    return (StatusCode::NOT_FOUND, Json(serde_json::json!({})));
                }
                (
                    StatusCode::OK,
                    Json(serde_json::json!({"data": {"token": "QmVhcmVyIHh5eg=="}})),
                )
            }),
        );
        let base = serve(router).await;
        let store = KubeStore::new(base, "argo");

        let value = store.get_secret("argo", "creds", "token").await.unwrap();
        assert_eq!(value, b"Bearer xyz");

        let missing_key = store.get_secret("argo", "creds", "other").await.unwrap_err();
        assert!(matches!(missing_key, StoreError::NotFound(_)));

        let missing = store.get_secret("argo", "nope", "token").await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[test]
    fn from_config_skips_missing_ca() {
        let config = KubeConfig {
            api_url: "https://10.0.0.1:6443/".into(),
            token_path: None,
            ca_path: Some(PathBuf::from("/nonexistent/ca.crt")),
        };
        let store = KubeStore::from_config(&config, "argo").unwrap();
        assert_eq!(
            store.task_sets_url(),
            "https://10.0.0.1:6443/apis/argoproj.io/v1alpha1/namespaces/argo/workflowtasksets"
        );
    }
}
