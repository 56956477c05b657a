//! End-to-end tests
//! Runs the real server on a loopback port and talks to it over HTTP

use std::sync::Arc;
use std::time::Duration;

use powermeter::api::{serve, AppState};
use powermeter::config::Config;
use powermeter::meter::SimulatedMeter;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct RunningServer {
    base: String,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<powermeter::error::Result<()>>,
}

impl RunningServer {
    async fn start() -> Self {
        let mut config = Config::default();
        config.meter.poll_interval_secs = 1;
        config.server.web_dir = std::env::temp_dir().join("powermeter-e2e-no-web");

        let meter = Arc::new(SimulatedMeter::default());
        let state = AppState::from_config(&config, meter);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state.clone(), config, async {
            let _ = rx.await;
        }));

        Self {
            base,
            state,
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

async fn wait_for_reading(client: &reqwest::Client, server: &RunningServer, token: &str) -> Value {
    for _ in 0..50 {
        let body: Value = client
            .get(server.url("/api/power"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body.get("voltage_v").is_some() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no reading published");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_e2e_login_read_logout() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["polling"], true);

    let login = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "viewer", "password": "viewer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), reqwest::StatusCode::OK);
    let login: Value = login.json().await.unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let reading = wait_for_reading(&client, &server, &token).await;
    assert_eq!(reading["authenticated"], true);
    assert_eq!(reading["user"], "viewer");
    assert!(reading["power_kw"].as_f64().unwrap() > 0.0);

    let logout = client
        .post(server.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), reqwest::StatusCode::OK);

    let after = client
        .get(server.url("/api/power"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: Value = after.json().await.unwrap();
    assert_eq!(body["code"], "AUTH_REQUIRED");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_e2e_shutdown_stops_acquisition() {
    let server = RunningServer::start().await;
    let state = server.state.clone();

    let client = reqwest::Client::new();
    let status = client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(state.acquisition.is_running().await);

    server.stop().await;
    assert!(!state.acquisition.is_running().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_e2e_cors_preflight() {
    let server = RunningServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, server.url("/api/auth/login"))
        .header("Origin", "http://example.test")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));

    server.stop().await;
}
