#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sonic_rs::JsonValueTrait;

use chat_ws::core::{ConnectionState, FixedDelayReconnect, WsFrame};
use chat_ws::testing::{MockConnection, MockServer, MockTransport, StaticProfileResolver};
use chat_ws::{ChatClient, ChatConfig, Credential};

pub type MockClient = ChatClient<MockTransport, StaticProfileResolver, FixedDelayReconnect>;

pub const TOKEN: &str = "good-token";

pub fn mock_client(resolver: StaticProfileResolver) -> (MockClient, MockServer) {
    let (transport, server) = MockTransport::channel_pair();
    let config = Arc::new(ChatConfig {
        ws_url: "ws://chat.test/ws/".to_string(),
        api_base_url: "http://chat.test".to_string(),
        ..ChatConfig::default()
    });
    let reconnect = FixedDelayReconnect::new(config.reconnect_delay);
    let client = ChatClient::with_parts(config, Credential::new(TOKEN), transport, resolver, reconnect)
        .expect("client");
    (client, server)
}

/// Connect and return the accepted socket with the activation frame already consumed.
pub async fn connect_open(client: &MockClient, server: &mut MockServer) -> MockConnection {
    client.connect().await.expect("connect");
    let mut conn = server.accept().await.expect("accepted socket");
    let activate = conn.recv_outbound().await.expect("activate frame");
    assert_eq!(envelope_type(&activate), Some(1));
    assert_eq!(client.state(), ConnectionState::Open);
    conn
}

/// `type` discriminant of an outbound JSON text frame.
pub fn envelope_type(frame: &WsFrame) -> Option<i64> {
    let text = frame.as_text()?;
    let value: sonic_rs::Value = sonic_rs::from_str(text).ok()?;
    value.get("type")?.as_i64()
}

pub fn parse(frame: &WsFrame) -> sonic_rs::Value {
    sonic_rs::from_str(frame.as_text().expect("text frame")).expect("json frame")
}

/// Poll `check` until it holds or `limit` of (virtual) time passes.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
