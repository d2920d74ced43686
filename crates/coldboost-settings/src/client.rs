//! HTTP client for the cold-start settings service.
//!
//! Both endpoints take a JSON body via POST:
//!
//! ```text
//! POST {base}/ksvc_revision_cold_start_settings  {"service": .., "namespace": ..}
//!   → {"enabled": bool, "pod_spec_json_patch": "<RFC 6902 document>"}
//! POST {base}/notify_scale_from_zero             <scale target JSON>
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use tracing::{debug, info};

use coldboost_core::{BoostConfig, ScaleTarget};

use crate::error::{SettingsError, SettingsResult};
use crate::types::{ColdStartSettings, SettingsKey, SettingsResponse, SettingsService};

pub const SETTINGS_PATH: &str = "/ksvc_revision_cold_start_settings";
pub const NOTIFY_PATH: &str = "/notify_scale_from_zero";

#[derive(Serialize)]
struct SettingsRequest<'a> {
    service: &'a str,
    namespace: &'a str,
}

/// `SettingsService` speaking HTTP/1.1 to a plain `http://` base URL.
#[derive(Debug, Clone)]
pub struct HttpSettingsClient {
    /// `host:port` to connect to.
    address: String,
    /// Value of the `Host` header.
    authority: String,
    /// Path prefix of the base URL, without trailing slash.
    base_path: String,
    timeout: Duration,
}

impl HttpSettingsClient {
    pub fn new(base_url: &str, timeout: Duration) -> SettingsResult<Self> {
        let uri: http::Uri = base_url
            .parse()
            .map_err(|e| SettingsError::InvalidUrl(format!("{base_url}: {e}")))?;
        if uri.scheme_str() != Some("http") {
            return Err(SettingsError::InvalidUrl(format!(
                "{base_url}: only http:// is supported"
            )));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| SettingsError::InvalidUrl(format!("{base_url}: missing host")))?;

        Ok(Self {
            address: format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80)),
            authority: authority.to_string(),
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &BoostConfig) -> SettingsResult<Self> {
        Self::new(&config.settings_url, config.settings_timeout_duration())
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> SettingsResult<Bytes> {
        let body = serde_json::to_vec(payload).map_err(|e| SettingsError::Encode(e.to_string()))?;
        let target = format!("{}{}", self.base_path, path);
        debug!(address = %self.address, path = %target, "calling settings service");

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| SettingsError::Transport(format!("connect {}: {e}", self.address)))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| SettingsError::Transport(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "settings connection closed with error");
                }
            });

            let req = http::Request::builder()
                .method(http::Method::POST)
                .uri(&target)
                .header(HOST, &self.authority)
                .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .header(USER_AGENT, "coldboost/0.1")
                .body(Full::new(Bytes::from(body)))
                .map_err(|e| SettingsError::Transport(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| SettingsError::Transport(format!("{target}: {e}")))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| SettingsError::Transport(format!("{target}: reading body: {e}")))?
                .to_bytes();

            if !status.is_success() {
                return Err(SettingsError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Ok::<_, SettingsError>(bytes)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SettingsError::Timeout(format!("{}{}", self.authority, target))),
        }
    }
}

#[async_trait]
impl SettingsService for HttpSettingsClient {
    async fn fetch_settings(&self, key: &SettingsKey) -> SettingsResult<ColdStartSettings> {
        let body = self
            .post_json(
                SETTINGS_PATH,
                &SettingsRequest {
                    service: &key.service,
                    namespace: &key.namespace,
                },
            )
            .await?;
        let resp: SettingsResponse =
            serde_json::from_slice(&body).map_err(|e| SettingsError::Decode(e.to_string()))?;
        ColdStartSettings::try_from(resp)
    }

    async fn notify_scale_from_zero(&self, target: &ScaleTarget) -> SettingsResult<()> {
        info!(scale_target = %target.key(), "notifying scale from zero");
        self.post_json(NOTIFY_PATH, target).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use coldboost_core::PatchOperation;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    async fn settings_handler(Json(req): Json<Value>) -> Result<Json<Value>, StatusCode> {
        match req["service"].as_str() {
            Some("api") => {
                assert_eq!(req["namespace"], "default");
                let patch = r#"[{"op":"add","path":"/nodeSelector","value":{"pool":"warm"}}]"#;
                Ok(Json(json!({"enabled": true, "pod_spec_json_patch": patch})))
            }
            Some("off") => Ok(Json(json!({"enabled": false, "pod_spec_json_patch": ""}))),
            Some("garbage") => Ok(Json(json!({"enabled": "maybe"}))),
            _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    async fn notify_handler(
        State(tx): State<mpsc::UnboundedSender<Value>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let _ = tx.send(body);
        StatusCode::OK
    }

    async fn slow_handler() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({"enabled": true}))
    }

    /// Serve the settings API on an ephemeral port under `prefix`.
    async fn spawn_server(prefix: &str) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let api = Router::new()
            .route(SETTINGS_PATH, post(settings_handler))
            .route(NOTIFY_PATH, post(notify_handler))
            .route("/slow", post(slow_handler))
            .with_state(tx);
        let app = if prefix.is_empty() {
            api
        } else {
            Router::new().nest(prefix, api)
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}{prefix}"), rx)
    }

    fn client(base: &str) -> HttpSettingsClient {
        HttpSettingsClient::new(base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn rejects_unsupported_urls() {
        assert!(matches!(
            HttpSettingsClient::new("https://settings:443", Duration::from_secs(1)),
            Err(SettingsError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpSettingsClient::new("not a url", Duration::from_secs(1)),
            Err(SettingsError::InvalidUrl(_))
        ));
    }

    #[test]
    fn default_port_is_80() {
        let c = client("http://settings.platform/");
        assert_eq!(c.address, "settings.platform:80");
        assert_eq!(c.authority, "settings.platform");
        assert_eq!(c.base_path, "");
    }

    #[tokio::test]
    async fn fetches_and_parses_settings() {
        let (base, _rx) = spawn_server("").await;
        let settings = client(&base)
            .fetch_settings(&SettingsKey::new("default", "api"))
            .await
            .unwrap();
        assert!(settings.enabled);
        assert_eq!(
            settings.patch,
            vec![PatchOperation::Add {
                path: "/nodeSelector".to_string(),
                value: json!({"pool": "warm"}),
            }]
        );
    }

    #[tokio::test]
    async fn respects_base_path() {
        let (base, _rx) = spawn_server("/internal").await;
        let settings = client(&base)
            .fetch_settings(&SettingsKey::new("default", "off"))
            .await
            .unwrap();
        assert_eq!(settings, ColdStartSettings::disabled());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base, _rx) = spawn_server("").await;
        let err = client(&base)
            .fetch_settings(&SettingsKey::new("default", "unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let (base, _rx) = spawn_server("").await;
        let err = client(&base)
            .fetch_settings(&SettingsKey::new("default", "garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Decode(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Port 1 won't be listening.
        let err = client("http://127.0.0.1:1")
            .fetch_settings(&SettingsKey::new("default", "api"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Transport(_)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let (base, _rx) = spawn_server("").await;
        let c = HttpSettingsClient::new(&base, Duration::from_millis(100)).unwrap();
        let err = c.post_json("/slow", &json!({})).await.unwrap_err();
        assert!(matches!(err, SettingsError::Timeout(_)));
    }

    #[tokio::test]
    async fn notify_posts_scale_target() {
        let (base, mut rx) = spawn_server("").await;
        let mut target = ScaleTarget::default();
        target.metadata.name = "api-00001-deployment".to_string();
        target.metadata.namespace = "default".to_string();

        client(&base).notify_scale_from_zero(&target).await.unwrap();
        let body = rx.recv().await.unwrap();
        assert_eq!(body["metadata"]["name"], "api-00001-deployment");
        assert_eq!(body["metadata"]["namespace"], "default");
    }
}
