//! REST collaborators: credential-to-profile resolution and chat history.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ChatConfig, DEFAULT_HISTORY_PAGE_SIZE, TOKEN_HEADER};
use crate::core::{ChatError, ChatResult};
use crate::protocol::{ApiEnvelope, ChatMessage, Profile, Sender, UNKNOWN_REGION};

pub const PROFILE_PATH: &str = "/api/user/get/login";
pub const HISTORY_PATH: &str = "/api/chat/message/page/vo";

/// Opaque bearer token. Never logged; `Debug` prints a placeholder.
#[derive(Clone)]
pub struct Credential(Arc<SecretString>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(SecretString::from(token.into())))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

pub type ProfileFuture = Pin<Box<dyn Future<Output = ChatResult<Profile>> + Send>>;

/// Exchanges a credential for the profile embedded in outbound messages.
///
/// One attempt per call; the connection actor owns retry policy.
pub trait ProfileResolver: Clone + Send + Sync + 'static {
    fn resolve(&self, credential: &Credential) -> ProfileFuture;
}

/// reqwest-backed client for the chat service REST API.
#[derive(Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    config: Arc<ChatConfig>,
}

impl HttpApi {
    pub fn new(config: Arc<ChatConfig>) -> ChatResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.connect_timeout)
            .build()
            .map_err(|err| ChatError::Config(format!("http client: {err}")))?;
        Ok(Self { http, config })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        credential: &Credential,
    ) -> ChatResult<reqwest::RequestBuilder> {
        let url = self.config.api_url(path)?;
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "*/*")
            .header(TOKEN_HEADER, credential.expose());
        for (name, value) in self.config.identity_headers() {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    /// Fetch the profile behind `credential`.
    ///
    /// A non-zero `code` or a profile without an id is `Auth`; anything that prevents
    /// reading a response envelope is `Network`.
    pub async fn fetch_profile(&self, credential: &Credential) -> ChatResult<Profile> {
        let response = self
            .request(reqwest::Method::GET, PROFILE_PATH, credential)?
            .send()
            .await
            .map_err(|err| ChatError::network("profile_fetch", err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ChatError::network("profile_fetch", err))?;

        let envelope: ApiEnvelope<Profile> = sonic_rs::from_slice(&body).map_err(|err| {
            ChatError::network("profile_fetch", format!("http {status}: {err}"))
        })?;

        match envelope {
            ApiEnvelope {
                code: Some(0),
                data: Some(profile),
                ..
            } if !profile.id.is_empty() => {
                info!(user_id = %profile.id, user = %profile.display_name(), "profile resolved");
                Ok(profile)
            }
            ApiEnvelope { code, message, .. } => {
                warn!(?code, %status, "profile fetch rejected credential");
                Err(ChatError::Auth {
                    message: message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "token is invalid or expired".to_string()),
                    code,
                })
            }
        }
    }

    /// Fetch the newest page of the public room, oldest first.
    ///
    /// `page_size == 0` falls back to 50. Records that cannot be read are skipped.
    pub async fn fetch_history(
        &self,
        credential: &Credential,
        page_size: u32,
    ) -> ChatResult<Vec<ChatMessage>> {
        let page_size = if page_size == 0 {
            DEFAULT_HISTORY_PAGE_SIZE
        } else {
            page_size
        };
        let query = HistoryQuery {
            current: 1,
            page_size,
            room_id: -1,
            sort_field: "createTime",
            sort_order: "desc",
        };
        let body = sonic_rs::to_string(&query)
            .map_err(|err| ChatError::InvalidState(format!("history query: {err}")))?;

        let response = self
            .request(reqwest::Method::POST, HISTORY_PATH, credential)?
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| ChatError::network("history_fetch", err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ChatError::network("history_fetch", err))?;

        let envelope: ApiEnvelope<HistoryPage> = sonic_rs::from_slice(&body).map_err(|err| {
            ChatError::network("history_fetch", format!("http {status}: {err}"))
        })?;
        if envelope.code != Some(0) {
            return Err(ChatError::Auth {
                message: envelope
                    .message
                    .unwrap_or_else(|| "history request rejected".to_string()),
                code: envelope.code,
            });
        }

        let records = envelope.data.map(|page| page.records).unwrap_or_default();
        let total = records.len();
        let mut messages: Vec<ChatMessage> = records
            .into_iter()
            .filter_map(|record| match record {
                Lenient::Parsed(record) => record.into_message(),
                Lenient::Skipped(_) => None,
            })
            .collect();
        // Newest first on the wire.
        messages.reverse();
        debug!(total, kept = messages.len(), "history page loaded");
        Ok(messages)
    }
}

impl ProfileResolver for HttpApi {
    fn resolve(&self, credential: &Credential) -> ProfileFuture {
        let api = self.clone();
        let credential = credential.clone();
        Box::pin(async move { api.fetch_profile(&credential).await })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    current: u32,
    page_size: u32,
    room_id: i64,
    sort_field: &'static str,
    sort_order: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct HistoryPage {
    records: Vec<Lenient<HistoryRecord>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Parsed(T),
    Skipped(IgnoredAny),
}

/// A history row: either a wrapped socket message or a flat database row.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct HistoryRecord {
    #[serde(deserialize_with = "crate::protocol::model::string_or_number::required")]
    id: String,
    message_wrapper: Option<WrappedMessage>,
    content: Option<String>,
    #[serde(deserialize_with = "crate::protocol::model::string_or_number::optional")]
    create_time: Option<String>,
    user: Option<Profile>,
    region: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WrappedMessage {
    message: Option<ChatMessage>,
}

impl HistoryRecord {
    fn into_message(self) -> Option<ChatMessage> {
        let now = || Utc::now().timestamp_millis().to_string();
        if let Some(wrapper) = self.message_wrapper {
            let mut message = wrapper.message?;
            if message.id.is_empty() {
                message.id = self.id;
            }
            if message.timestamp.is_empty() {
                message.timestamp = now();
            }
            return Some(message);
        }

        let content = self.content?;
        let user = self.user?;
        let region = self.region.unwrap_or_else(|| UNKNOWN_REGION.to_string());
        let country = self.country.unwrap_or_else(|| UNKNOWN_REGION.to_string());
        let mut sender = Sender::from_profile(Some(&user));
        sender.region = region.clone();
        sender.country = country.clone();
        Some(ChatMessage {
            id: self.id,
            content,
            sender,
            timestamp: self.create_time.unwrap_or_else(now),
            region: Some(region),
            country: Some(country),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer) -> HttpApi {
        let config = ChatConfig {
            api_base_url: server.uri(),
            ..ChatConfig::default()
        };
        HttpApi::new(Arc::new(config)).expect("http client")
    }

    #[tokio::test]
    async fn profile_fetch_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .and(header(TOKEN_HEADER, "good-token"))
            .and(header("origin", "https://yucoder.cn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json_body(
                r#"{"code":0,"data":{"id":"1001","userName":"alice","userRole":"admin","level":3}}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let profile = api
            .resolve(&Credential::new("good-token"))
            .await
            .expect("profile resolves");
        assert_eq!(profile.id, "1001");
        assert!(profile.is_admin());
    }

    #[tokio::test]
    async fn rejected_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json_body(r#"{"code":40100,"message":"未登录"}"#)),
            )
            .mount(&server)
            .await;

        let err = api_for(&server)
            .await
            .fetch_profile(&Credential::new("bad-token"))
            .await
            .expect_err("rejected");
        match err {
            ChatError::Auth { code, message } => {
                assert_eq!(code, Some(40100));
                assert_eq!(message, "未登录");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_identity_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json_body(r#"{"code":0,"data":{"userName":"x"}}"#)),
            )
            .mount(&server)
            .await;

        let err = api_for(&server)
            .await
            .fetch_profile(&Credential::new("t"))
            .await
            .expect_err("no id");
        assert!(matches!(err, ChatError::Auth { code: Some(0), .. }));
    }

    #[tokio::test]
    async fn unreadable_body_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = api_for(&server)
            .await
            .fetch_profile(&Credential::new("t"))
            .await
            .expect_err("not json");
        assert!(matches!(err, ChatError::Network { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let config = ChatConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            ..ChatConfig::default()
        };
        let api = HttpApi::new(Arc::new(config)).expect("http client");
        let err = api
            .fetch_profile(&Credential::new("t"))
            .await
            .expect_err("refused");
        assert!(matches!(err, ChatError::Network { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn history_is_reversed_and_tolerates_both_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(HISTORY_PATH))
            .and(body_json(serde_json_body(
                r#"{"current":1,"pageSize":50,"roomId":-1,"sortField":"createTime","sortOrder":"desc"}"#,
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json_body(
                r#"{"code":0,"data":{"records":[
                    {"id":"3","messageWrapper":{"message":{"id":"3","content":"newest","sender":{"id":"7","name":"bo"},"timestamp":"t3"}}},
                    {"id":2,"content":"flat","createTime":"2025-05-20 08:00:00","user":{"id":8,"userName":"cy","userRole":"admin"}},
                    {"id":"x","content":"no user"},
                    42
                ]}}"#,
            )))
            .mount(&server)
            .await;

        let history = api_for(&server)
            .await
            .fetch_history(&Credential::new("t"), 0)
            .await
            .expect("history");
        let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
        assert_eq!(history[0].sender.name, "cy");
        assert!(history[0].sender.is_admin);
        assert_eq!(history[0].timestamp, "2025-05-20 08:00:00");
        assert_eq!(history[1].content, "newest");
    }

    #[tokio::test]
    async fn history_rejection_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(HISTORY_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json_body(r#"{"code":40100}"#)),
            )
            .mount(&server)
            .await;

        let err = api_for(&server)
            .await
            .fetch_history(&Credential::new("t"), 10)
            .await
            .expect_err("rejected");
        assert!(matches!(err, ChatError::Auth { code: Some(40100), .. }));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret");
        assert_eq!(format!("{credential:?}"), "Credential([REDACTED])");
        assert_eq!(credential.expose(), "super-secret");
        assert!(Credential::new("  ").is_empty());
    }

    fn serde_json_body(json: &str) -> sonic_rs::Value {
        sonic_rs::from_str(json).expect("fixture json")
    }
}
