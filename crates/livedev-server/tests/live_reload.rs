//! End-to-end tests against a real server and a real WebSocket client.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use livedev_server::{Server, ServerConfig, ServerError, WatchSetupError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    fn ws_url(&self) -> String {
        format!("ws://{}/__livereload", self.addr)
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        let result = timeout(TIMEOUT, self.handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))), "server did not stop cleanly");
    }
}

fn config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        root_dir: root.to_path_buf(),
        debounce: Duration::from_millis(100),
        handshake_timeout: Duration::from_millis(300),
        ..ServerConfig::default()
    }
}

async fn boot(config: &ServerConfig) -> TestServer {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_until(async {
        let _ = stopped.await;
    }));
    TestServer { addr, stop, handle }
}

/// Connect and complete the handshake.
async fn connect(url: &str) -> WsStream {
    let (mut ws, _) = connect_async(url).await.unwrap();
    ws.send(Message::text(r#"{"type":"hello"}"#)).await.unwrap();
    // Registration happens right after the hello is read
    tokio::time::sleep(Duration::from_millis(200)).await;
    ws
}

/// Read the next text frame.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

/// Wait until the server closes the channel.
async fn expect_closed(ws: &mut WsStream) {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("channel stayed open") {
            Some(Ok(Message::Close(_)) | Err(_)) | None => return,
            Some(Ok(_)) => {}
        }
    }
}

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<html><body><h1>Home</h1></body></html>",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn saving_a_watched_file_reloads_the_page() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let mut ws = connect(&server.ws_url()).await;

    std::fs::write(dir.path().join("style.css"), "h1 { color: blue; }").unwrap();

    assert_eq!(read_text(&mut ws).await, r#"{"type":"reload"}"#);
    server.stop().await;
}

#[tokio::test]
async fn burst_of_saves_reloads_once() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let mut ws = connect(&server.ws_url()).await;

    for i in 0..5 {
        std::fs::write(dir.path().join("app.js"), format!("let v = {i};")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(read_text(&mut ws).await, r#"{"type":"reload"}"#);
    let second = timeout(Duration::from_millis(500), ws.next()).await;
    assert!(second.is_err(), "unexpected second message: {second:?}");
    server.stop().await;
}

#[tokio::test]
async fn unwatched_extension_does_not_reload() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let mut ws = connect(&server.ws_url()).await;

    std::fs::write(dir.path().join("notes.txt"), "todo").unwrap();

    let message = timeout(Duration::from_millis(600), ws.next()).await;
    assert!(message.is_err(), "unexpected message: {message:?}");
    server.stop().await;
}

#[tokio::test]
async fn vanished_client_does_not_block_others() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let gone = connect(&server.ws_url()).await;
    let mut healthy = connect(&server.ws_url()).await;

    drop(gone);
    std::fs::write(dir.path().join("index.html"), "<p>edited</p>").unwrap();

    assert_eq!(read_text(&mut healthy).await, r#"{"type":"reload"}"#);
    server.stop().await;
}

#[tokio::test]
async fn client_without_handshake_is_disconnected() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    expect_closed(&mut ws).await;
    server.stop().await;
}

#[tokio::test]
async fn malformed_handshake_is_disconnected() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();

    ws.send(Message::text("reload me")).await.unwrap();

    expect_closed(&mut ws).await;
    server.stop().await;
}

#[tokio::test]
async fn stopping_the_server_closes_channels() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let mut ws = connect(&server.ws_url()).await;

    server.stop().await;

    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn shutdown_close_frame_lets_the_page_reconnect() {
    let dir = site();
    let server = boot(&config(dir.path())).await;
    let mut ws = connect(&server.ws_url()).await;

    server.stop().await;

    let frame = loop {
        match timeout(TIMEOUT, ws.next()).await.expect("channel stayed open") {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected a close frame, got {other:?}"),
        }
    };
    let code = frame.expect("close frame without a code").code;
    // 4000 would tell the page to stop reconnecting
    assert_eq!(code, CloseCode::Away);
    assert_ne!(u16::from(code), livedev_assets::SESSION_DROPPED_CLOSE_CODE);
}

#[tokio::test]
async fn html_is_served_with_client_script() {
    let dir = site();
    let server = boot(&config(dir.path())).await;

    let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(TIMEOUT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.to_ascii_lowercase().contains("cache-control: no-cache"));
    assert!(response.contains("<h1>Home</h1><script src=\"/__livereload.js\"></script></body>"));
    server.stop().await;
}

#[tokio::test]
async fn missing_root_fails_before_binding() {
    let dir = tempfile::tempdir().unwrap();
    let port = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap().port()
    };
    let mut config = config(&dir.path().join("missing"));
    config.port = port;

    let result = Server::bind(&config).await;

    assert!(matches!(
        result,
        Err(ServerError::WatchSetup(WatchSetupError::RootMissing(_)))
    ));
    // The port was never taken
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn live_reload_can_be_disabled() {
    let dir = site();
    let mut config = config(dir.path());
    config.live_reload_enabled = false;
    let server = boot(&config).await;

    let result = connect_async(server.ws_url()).await;

    assert!(result.is_err());
    server.stop().await;
}
