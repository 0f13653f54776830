#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use futures_util::{SinkExt, StreamExt};
use slotgate_gateway::{
    api,
    auth::MemoryIdentityStore,
    clock::FixedClock,
    device::{MockPipeline, MockScript},
    ledger::MemoryLedger,
    state::{AppState, StateOptions},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 2026-03-14, the day every test runs on.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    today().and_hms_opt(hour, minute, 0).unwrap()
}

pub struct TestApp {
    pub base_url: String,
    pub ws_url: String,
    pub client: reqwest::Client,
    pub clock: Arc<FixedClock>,
    pub pipeline: Arc<MockPipeline>,
    pub staging: tempfile::TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(MockScript::default(), chrono::Duration::minutes(60)).await
}

pub async fn spawn_app_with(script: MockScript, token_lifetime: chrono::Duration) -> TestApp {
    let clock = Arc::new(FixedClock::new(at(14, 5)));
    let pipeline = Arc::new(MockPipeline::new(script));
    let staging = tempfile::tempdir().unwrap();

    let state = AppState::new(
        Arc::new(MemoryLedger::new()),
        Arc::new(MemoryIdentityStore::new()),
        pipeline.clone(),
        clock.clone(),
        StateOptions {
            token_lifetime,
            staging_root: staging.path().to_path_buf(),
            cors_origin: None,
        },
    );
    let app = api::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        client: reqwest::Client::new(),
        clock,
        pipeline,
        staging,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Registers `username` and returns a bearer token for it.
    pub async fn sign_up(&self, username: &str) -> String {
        let credentials = serde_json::json!({ "username": username, "password": "hunter22" });

        let resp = self
            .client
            .post(self.url("/v1/auth/register"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201, "register {username}");

        let resp = self
            .client
            .post(self.url("/v1/auth/login"))
            .json(&credentials)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "login {username}");

        let body: serde_json::Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn book(&self, token: &str, slot_time: &str) -> reqwest::Response {
        self.client
            .post(self.url("/v1/bookings"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "slotTime": slot_time }))
            .send()
            .await
            .unwrap()
    }

    pub async fn connect(&self, path: &str, token: &str) -> Socket {
        let (socket, _) = connect_async(format!("{}{path}?token={token}", self.ws_url))
            .await
            .unwrap();
        socket
    }

    /// Connects to the live channel and waits until the server side is
    /// registered and listening to the group.
    pub async fn join_live(&self, token: &str) -> Socket {
        let mut socket = self.connect("/v1/live", token).await;
        socket.send(Message::text("hello?")).await.unwrap();
        let reply = next_json(&mut socket).await;
        assert_eq!(reply["event"], "booking-error");
        assert_eq!(reply["data"]["message"], "Malformed event");
        socket
    }
}

/// Next text frame, or `None` when the socket closes.
pub async fn next_text(socket: &mut Socket) -> Option<String> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn next_json(socket: &mut Socket) -> serde_json::Value {
    let text = next_text(socket).await.expect("socket closed");
    serde_json::from_str(&text).unwrap()
}

pub async fn send_text(socket: &mut Socket, text: &str) {
    socket.send(Message::text(text)).await.unwrap();
}

/// Waits for `dir` to have no entries.
pub async fn wait_until_empty(dir: &Path) {
    for _ in 0..100 {
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        if entries.next_entry().await.unwrap().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} still has entries", dir.display());
}
