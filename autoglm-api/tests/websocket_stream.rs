use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use autoglm_api::{create_router, AppState};
use autoglm_core::adb::mock::MockTransport;
use autoglm_core::Config;
use autoglm_stream::mock::{annex_b, idr, pps, slice, sps, MockLauncher, MockScript};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn serve(script: MockScript) -> (SocketAddr, AppState) {
    let mut config = Config::default();
    config.adb.tcpip_settle_ms = 0;
    let state = AppState::new(
        &config,
        Arc::new(MockTransport::new()),
        Arc::new(MockLauncher::new(script)),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(state.clone(), &[]);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

async fn open(addr: SocketAddr, query: &str) -> Client {
    let url = format!("ws://{addr}/api/video/stream{query}");
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("no message from server")
        .expect("stream ended")
        .unwrap()
}

#[tokio::test]
async fn test_bootstrap_blob_then_single_units() {
    let (addr, _state) = serve(MockScript::healthy()).await;
    let mut client = open(addr, "?device_id=USB1").await;

    assert_eq!(
        next_message(&mut client).await,
        Message::Binary(annex_b(&[sps(), pps(), idr()]))
    );
    for _ in 0..5 {
        assert_eq!(next_message(&mut client).await, Message::Binary(slice()));
    }
}

#[tokio::test]
async fn test_missing_device_id_gets_error_message() {
    let (addr, _state) = serve(MockScript::healthy()).await;
    let mut client = open(addr, "").await;

    let msg = next_message(&mut client).await;
    let body: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "device_id is required" }));

    assert!(matches!(next_message(&mut client).await, Message::Close(_)));
}

#[tokio::test]
async fn test_client_close_ends_relay() {
    let (addr, state) = serve(MockScript::healthy()).await;
    let mut client = open(addr, "?device_id=USB1").await;

    assert!(matches!(next_message(&mut client).await, Message::Binary(_)));
    client.close(None).await.unwrap();

    // Frames already in flight may arrive before the server's Close reply
    let got_close = tokio::time::timeout(WAIT, async {
        while let Some(msg) = client.next().await {
            match msg {
                Ok(Message::Close(_)) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(got_close, "server never answered the client's Close");

    // The session outlives its viewer
    assert_eq!(state.registry().active_count(), 1);
}

#[tokio::test]
async fn test_second_viewer_after_close_gets_bootstrap() {
    let (addr, _state) = serve(MockScript::healthy()).await;

    let mut first = open(addr, "?device_id=USB1").await;
    next_message(&mut first).await;
    first.send(Message::Close(None)).await.unwrap();
    drop(first);

    let mut second = open(addr, "?device_id=USB1").await;
    assert_eq!(
        next_message(&mut second).await,
        Message::Binary(annex_b(&[sps(), pps(), idr()]))
    );
}
