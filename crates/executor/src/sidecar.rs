//! HTTP executor plugins.
//!
//! A plugin sidecar listens on a local address and accepts
//! `POST /api/v1/template.execute` with an [`ExecuteTemplateArgs`] body. It
//! answers with an [`ExecuteTemplateReply`]. A 404 means the sidecar does not
//! implement the endpoint and is treated as a decline.

use async_trait::async_trait;
use flowhand_config::PluginConfig;
use flowhand_core::error::PluginError;
use flowhand_core::plugin::{ExecuteTemplateArgs, ExecuteTemplateReply, TemplateExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const EXECUTE_PATH: &str = "/api/v1/template.execute";

/// A plugin reached over HTTP.
pub struct HttpPluginExecutor {
    name: String,
    address: String,
    token_path: Option<PathBuf>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpPluginExecutor {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        token_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into().trim_end_matches('/').to_string(),
            token_path,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(
            &config.name,
            &config.address,
            config.token_path.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Read the bearer token. The file is re-read on every call so a rotated
    /// token is picked up without a restart.
    async fn token(&self) -> Result<Option<String>, PluginError> {
        let Some(path) = &self.token_path else {
            return Ok(None);
        };
        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PluginError::Failed {
                plugin: self.name.clone(),
                reason: format!("failed to read token {}: {e}", path.display()),
            })?;
        Ok(Some(token.trim().to_string()))
    }
}

#[async_trait]
impl TemplateExecutor for HttpPluginExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_template(
        &self,
        args: &ExecuteTemplateArgs,
    ) -> Result<ExecuteTemplateReply, PluginError> {
        let url = format!("{}{EXECUTE_PATH}", self.address);
        trace!(plugin = %self.name, url = %url, "Calling plugin");

        let mut request = self.client.post(&url).json(args).timeout(self.timeout);
        if let Some(token) = self.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PluginError::Timeout {
                    plugin: self.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                PluginError::Failed {
                    plugin: self.name.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(plugin = %self.name, "Plugin does not implement template execution");
            return Ok(ExecuteTemplateReply::decline());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PluginError::Status {
                plugin: self.name.clone(),
                status_code: status.as_u16(),
                body,
            });
        }

        response
            .json::<ExecuteTemplateReply>()
            .await
            .map_err(|e| PluginError::InvalidReply {
                plugin: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// Build the plugin chain in configuration order.
pub fn plugins_from_config(configs: &[PluginConfig]) -> Vec<Arc<dyn TemplateExecutor>> {
    configs
        .iter()
        .map(|c| Arc::new(HttpPluginExecutor::from_config(c)) as Arc<dyn TemplateExecutor>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::serve;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use flowhand_core::node::NodePhase;
    use flowhand_core::template::Template;
    use std::io::Write;

    fn args() -> ExecuteTemplateArgs {
        ExecuteTemplateArgs::new(
            "wf",
            Template {
                name: "hello".into(),
                plugin: Some(serde_json::json!({"hello": {"greeting": "hi"}})),
                ..Template::default()
            },
        )
    }

    fn reply_router() -> Router {
        Router::new().route(
            EXECUTE_PATH,
            post(|headers: HeaderMap, Json(args): Json<ExecuteTemplateArgs>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                Json(serde_json::json!({
                    "node": {
                        "phase": "Running",
                        "message": format!("{} {}", args.workflow.metadata.name, auth),
                    },
                    "requeue": "2m",
                }))
            }),
        )
    }

    #[tokio::test]
    async fn posts_args_and_parses_reply() {
        let base = serve(reply_router()).await;
        let mut token = tempfile::NamedTempFile::new().unwrap();
        writeln!(token, "s3cret").unwrap();

        let plugin = HttpPluginExecutor::new(
            "hello",
            format!("{base}/"),
            Some(token.path().to_path_buf()),
            Duration::from_secs(5),
        );
        let reply = plugin.execute_template(&args()).await.unwrap();

        let node = reply.node.clone().unwrap();
        assert_eq!(node.phase, Some(NodePhase::Running));
        assert_eq!(node.message, "wf Bearer s3cret");
        assert_eq!(reply.requeue(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn not_found_is_a_decline() {
        let base = serve(Router::new()).await;
        let plugin = HttpPluginExecutor::new("absent", base, None, Duration::from_secs(5));

        let reply = plugin.execute_template(&args()).await.unwrap();
        assert_eq!(reply, ExecuteTemplateReply::decline());
    }

    #[tokio::test]
    async fn server_error_is_a_plugin_error() {
        let base = serve(Router::new().route(
            EXECUTE_PATH,
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "kaput") }),
        ))
        .await;
        let plugin = HttpPluginExecutor::new("broken", base, None, Duration::from_secs(5));

        let err = plugin.execute_template(&args()).await.unwrap_err();
        match err {
            PluginError::Status {
                plugin,
                status_code,
                body,
            } => {
                assert_eq!(plugin, "broken");
                assert_eq!(status_code, 500);
                assert_eq!(body, "kaput");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn garbage_reply_is_invalid() {
        let base = serve(Router::new().route(EXECUTE_PATH, post(|| async { "not json" }))).await;
        let plugin = HttpPluginExecutor::new("garbled", base, None, Duration::from_secs(5));

        let err = plugin.execute_template(&args()).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidReply { .. }));
    }

    #[tokio::test]
    async fn missing_token_file_fails() {
        let plugin = HttpPluginExecutor::new(
            "p",
            "http://127.0.0.1:9",
            Some(PathBuf::from("/nonexistent/flowhand/token")),
            Duration::from_secs(1),
        );
        let err = plugin.execute_template(&args()).await.unwrap_err();
        assert!(err.to_string().contains("failed to read token"));
    }

    #[test]
    fn chain_keeps_config_order() {
        let configs = vec![
            PluginConfig {
                name: "first".into(),
                address: "http://localhost:7000".into(),
                token_path: None,
                timeout_secs: 30,
            },
            PluginConfig {
                name: "second".into(),
                address: "http://localhost:7001".into(),
                token_path: None,
                timeout_secs: 10,
            },
        ];
        let chain = plugins_from_config(&configs);
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["first", "second"]);
    }
}
