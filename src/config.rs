//! Client configuration.
//!
//! Everything here is safe to keep in a file; the credential is supplied separately.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::core::{
    ChatError, ChatResult, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_DELAY,
    WebSocketBufferConfig,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.yucoder.cn";
pub const DEFAULT_WS_URL: &str = "wss://api.yucoder.cn/ws/";
pub const DEFAULT_ORIGIN: &str = "https://yucoder.cn";
pub const DEFAULT_REFERER: &str = "https://yucoder.cn/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Header carrying the credential on every request.
pub const TOKEN_HEADER: &str = "fish-dog-token";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub origin: String,
    pub referer: String,
    pub user_agent: String,
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    pub heartbeat_interval: Duration,
    #[serde(rename = "reconnect_delay_ms", with = "duration_ms")]
    pub reconnect_delay: Duration,
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    pub history_page_size: u32,
    pub message_buffer_capacity: usize,
    pub ws_buffers: WebSocketBufferConfig,
    pub tcp_nodelay: bool,
    pub display: DisplayPreferences,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            message_buffer_capacity: 200,
            ws_buffers: WebSocketBufferConfig::default(),
            tcp_nodelay: true,
            display: DisplayPreferences::default(),
        }
    }
}

/// Rendering preferences passed through to consumers. Never consulted by the protocol.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayPreferences {
    pub show_avatar: bool,
    pub show_images: bool,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            show_avatar: true,
            show_images: true,
        }
    }
}

impl ChatConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ChatResult<Self> {
        let config: Self =
            sonic_rs::from_str(json).map_err(|err| ChatError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(ChatError::Config("heartbeat_interval_ms must be > 0".to_string()));
        }
        if self.reconnect_delay.is_zero() {
            return Err(ChatError::Config("reconnect_delay_ms must be > 0".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ChatError::Config("connect_timeout_ms must be > 0".to_string()));
        }
        let ws = Url::parse(&self.ws_url)
            .map_err(|err| ChatError::Config(format!("ws_url: {err}")))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ChatError::Config(format!(
                "ws_url must use ws:// or wss://, got {}",
                ws.scheme()
            )));
        }
        Url::parse(&self.api_base_url)
            .map_err(|err| ChatError::Config(format!("api_base_url: {err}")))?;
        Ok(())
    }

    /// Socket URL with the credential as the `token` query value.
    pub fn socket_url(&self, token: &str) -> ChatResult<String> {
        let mut url = Url::parse(&self.ws_url)
            .map_err(|err| ChatError::Config(format!("ws_url: {err}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }

    /// Absolute URL of a REST endpoint under `api_base_url`.
    pub fn api_url(&self, path: &str) -> ChatResult<Url> {
        let base = Url::parse(&self.api_base_url)
            .map_err(|err| ChatError::Config(format!("api_base_url: {err}")))?;
        base.join(path)
            .map_err(|err| ChatError::Config(format!("endpoint {path}: {err}")))
    }

    /// Browser-identity headers sent with every request, credential excluded.
    pub fn identity_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Origin".to_string(), self.origin.clone()),
            ("Referer".to_string(), self.referer.clone()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ]
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_behaviour() {
        let config = ChatConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.history_page_size, 50);
        assert!(config.display.show_avatar && config.display.show_images);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config = ChatConfig::from_json_str(
            r#"{"ws_url":"ws://127.0.0.1:9001/ws/","heartbeat_interval_ms":1000,"display":{"show_images":false}}"#,
        )
        .expect("parses");
        assert_eq!(config.ws_url, "ws://127.0.0.1:9001/ws/");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert!(config.display.show_avatar);
        assert!(!config.display.show_images);
    }

    #[test]
    fn rejects_bad_values() {
        let err = ChatConfig::from_json_str(r#"{"reconnect_delay_ms":0}"#).expect_err("zero delay");
        assert!(matches!(err, ChatError::Config(_)));
        let err = ChatConfig::from_json_str(r#"{"ws_url":"https://example.com"}"#).expect_err("scheme");
        assert!(matches!(err, ChatError::Config(_)));
        let err = ChatConfig::from_json_str("[1,2]").expect_err("not an object");
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn socket_url_encodes_token() {
        let config = ChatConfig::default();
        let url = config.socket_url("a b&c").expect("url");
        assert_eq!(url, "wss://api.yucoder.cn/ws/?token=a+b%26c");
    }

    #[test]
    fn api_url_joins_paths() {
        let config = ChatConfig::default();
        let url = config.api_url("/api/user/get/login").expect("url");
        assert_eq!(url.as_str(), "https://api.yucoder.cn/api/user/get/login");
    }
}
