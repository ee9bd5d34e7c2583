// Shared one-time server bootstrap for the integration tests.
#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use ice_age_operation::{
    app::AppState,
    config::Config,
    http::build_router,
    util::time::init_server_time,
    ws::protocol::{ClientMsg, ServerMsg},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

pub const STAGE_KEY: &str = "TEST-01";
pub const BROKEN_STAGE_KEY: &str = "BROKEN-01";

const STAGE_JSON: &str = r######"{
  "tileSize": 40,
  "tiles": ["#####", "#S.~#", "#####"],
  "events": [{ "id": "gen", "type": "objective", "title": "Generator", "radius": 30, "tileX": 2, "tileY": 1 }]
}"######;

/// Start the server once per test binary and return its `http://` base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        let stage_dir = write_stage_dir();

        // The server gets its own runtime so it outlives each `#[tokio::test]` runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");

                init_server_time();
                let config = Config {
                    server_addr: addr,
                    stage_dir,
                    signal_rate_limit: 1000,
                    ..Config::default()
                };
                let router = build_router(AppState::new(config));

                let _ = published_url_thread.set(format!("http://{addr}"));
                axum::serve(listener, router).await.expect("server failed");
            });
        });
        wait_for_server(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn write_stage_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ice-age-operation-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create stage dir");
    std::fs::write(dir.join(format!("{STAGE_KEY}.json")), STAGE_JSON).expect("write stage");
    std::fs::write(
        dir.join(format!("{BROKEN_STAGE_KEY}.json")),
        r####"{"tiles": ["###", "#"]}"####,
    )
    .expect("write broken stage");
    dir
}

fn wait_for_server(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

// ============================================================================
// Signaling socket helpers
// ============================================================================

pub async fn connect() -> Socket {
    let base_url = ensure_server();
    let ws_url = format!("{}/ws", base_url.replacen("http://", "ws://", 1));
    let (socket, _) = connect_async(ws_url).await.expect("websocket connect");
    socket
}

pub async fn send(socket: &mut Socket, msg: &ClientMsg) {
    let text = serde_json::to_string(msg).expect("encode client message");
    send_text(socket, &text).await;
}

pub async fn send_text(socket: &mut Socket, text: &str) {
    socket
        .send(Message::Text(text.to_string()))
        .await
        .expect("websocket send");
}

/// Next relay message; panics after two seconds of silence
pub async fn recv(socket: &mut Socket) -> ServerMsg {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for relay message")
            .expect("socket closed")
            .expect("websocket error");
        if let Message::Text(text) = next {
            return serde_json::from_str(&text).expect("decode server message");
        }
    }
}

/// Unique room code per test so parallel tests never collide
pub fn unique_code(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..8]).to_uppercase()
}
