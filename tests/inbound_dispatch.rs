mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chat_ws::core::{ConnectionState, WsFrame};
use chat_ws::protocol::{InboundKind, InboundMessage};
use chat_ws::testing::{StaticProfileResolver, sample_profile};

use common::{connect_open, mock_client, wait_until};

const CHAT_FRAME: &str = r#"{
    "type": "chat",
    "data": {
        "type": "chat",
        "message": {
            "id": "42",
            "content": "hi all",
            "sender": {"id": 7, "name": "bob", "avatar": "", "level": 2, "points": 5,
                       "isAdmin": false, "region": "上海", "country": "中国"},
            "timestamp": "2025-06-01T08:00:00.000Z"
        }
    }
}"#;

fn collect(client: &common::MockClient) -> Arc<parking_lot::Mutex<Vec<InboundMessage>>> {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on_message(move |message| sink.lock().push(message.clone()));
    seen
}

#[tokio::test(start_paused = true)]
async fn chat_frames_reach_the_message_channel() {
    let (client, mut server) = mock_client(StaticProfileResolver::accepting(sample_profile()));
    let seen = collect(&client);
    let conn = connect_open(&client, &mut server).await;

    conn.send_text(CHAT_FRAME).expect("push");
    assert!(wait_until(Duration::from_secs(1), || seen.lock().len() == 1).await);

    let seen = seen.lock();
    assert!(seen[0].is_chat());
    let message = seen[0].chat_message().expect("chat payload");
    assert_eq!(message.id, "42");
    assert_eq!(message.content, "hi all");
    assert_eq!(message.sender.id, "7");
    assert_eq!(message.sender.region, "上海");
}

#[tokio::test(start_paused = true)]
async fn unrecognized_kinds_pass_through_verbatim() {
    let (client, mut server) = mock_client(StaticProfileResolver::accepting(sample_profile()));
    let seen = collect(&client);
    let presence = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&presence);
    client.on_user_online(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let conn = connect_open(&client, &mut server).await;

    let frames = [
        r#"{"type":"userOnline","data":[{"id":1,"name":"amy"}]}"#,
        r#"{"type":3,"data":{}}"#,
        r#"{"data":{"note":"no discriminant"}}"#,
    ];
    for frame in frames {
        conn.send_text(frame).expect("push");
    }
    assert!(wait_until(Duration::from_secs(1), || seen.lock().len() == 3).await);

    let seen = seen.lock();
    assert_eq!(seen[0].kind(), &InboundKind::Named("userOnline".to_string()));
    assert_eq!(seen[1].kind(), &InboundKind::Numeric(3));
    assert_eq!(seen[2].kind(), &InboundKind::Missing);
    for (message, frame) in seen.iter().zip(frames) {
        assert_eq!(message.payload(), frame.as_bytes());
    }
    assert_eq!(presence.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_isolated() {
    let (client, mut server) = mock_client(StaticProfileResolver::accepting(sample_profile()));
    let seen = collect(&client);
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    client.on_error(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let conn = connect_open(&client, &mut server).await;

    conn.send_text("not json at all").expect("push");
    conn.send_text("[1,2,3]").expect("push");
    conn.send_inbound(WsFrame::Binary(bytes::Bytes::from_static(b"\xff\xfe")))
        .expect("push");
    conn.send_text(CHAT_FRAME).expect("push");

    assert!(wait_until(Duration::from_secs(1), || seen.lock().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().len(), 1);
    assert!(seen.lock()[0].is_chat());
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn frames_are_delivered_in_arrival_order() {
    let (client, mut server) = mock_client(StaticProfileResolver::accepting(sample_profile()));
    let seen = collect(&client);
    let conn = connect_open(&client, &mut server).await;

    for n in 0..20 {
        conn.send_text(format!(r#"{{"type":"tick","n":{n}}}"#)).expect("push");
    }
    assert!(wait_until(Duration::from_secs(1), || seen.lock().len() == 20).await);

    let expected: Vec<String> = (0..20).map(|n| format!(r#"{{"type":"tick","n":{n}}}"#)).collect();
    let seen = seen.lock();
    for (message, frame) in seen.iter().zip(&expected) {
        assert_eq!(message.payload(), frame.as_bytes());
    }
}

#[tokio::test(start_paused = true)]
async fn frames_after_disconnect_are_not_dispatched() {
    let (client, mut server) = mock_client(StaticProfileResolver::accepting(sample_profile()));
    let seen = collect(&client);
    let conn = connect_open(&client, &mut server).await;

    client.disconnect().await.expect("disconnect");
    let _ = conn.send_text(CHAT_FRAME);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen.lock().is_empty());
}
