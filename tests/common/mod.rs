//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use flick_api::config::AppConfig;
use flick_api::http::AppState;
use flick_api::lifecycle::shutdown::ShutdownState;
use flick_api::lifecycle::signals::{SignalListener, SignalTrigger, TerminationSignal};
use flick_api::lifecycle::{Application, BackgroundTaskTracker};

/// A running server driven by a manual signal trigger.
pub struct TestApp {
    pub addr: SocketAddr,
    pub trigger: SignalTrigger,
    pub state: watch::Receiver<ShutdownState>,
    pub tasks: BackgroundTaskTracker,
    pub finished: Arc<AtomicBool>,
    pub handle: JoinHandle<flick_api::Result<()>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn signal(&self) {
        assert!(self.trigger.send(TerminationSignal::Terminate));
    }
}

/// Defaults with an ephemeral loopback port.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config
}

/// Routes used to hold connections and background work open.
///
/// - `GET /slow?ms=N` answers after N milliseconds
/// - `POST /defer?ms=N` spawns a background task that sets `finished`
///   after N milliseconds, then answers 202
fn test_routes(finished: Arc<AtomicBool>) -> Router<AppState> {
    Router::new()
        .route(
            "/slow",
            get(|axum::extract::Query(q): axum::extract::Query<Delay>| async move {
                tokio::time::sleep(Duration::from_millis(q.ms)).await;
                "done"
            }),
        )
        .route(
            "/defer",
            post(
                move |State(state): State<AppState>,
                      axum::extract::Query(q): axum::extract::Query<Delay>| {
                    let finished = Arc::clone(&finished);
                    async move {
                        state.tasks.spawn("deferred", async move {
                            tokio::time::sleep(Duration::from_millis(q.ms)).await;
                            finished.store(true, Ordering::SeqCst);
                        });
                        StatusCode::ACCEPTED
                    }
                },
            ),
        )
}

#[derive(serde::Deserialize)]
struct Delay {
    ms: u64,
}

/// Bind, build and run an application on its own task.
pub async fn spawn_app(config: AppConfig) -> TestApp {
    let finished = Arc::new(AtomicBool::new(false));
    let app = Application::build(config)
        .await
        .expect("application should build")
        .with_routes(test_routes(Arc::clone(&finished)));

    let addr = app.local_addr().unwrap();
    let state = app.shutdown_state();
    let tasks = app.tasks().clone();
    let (trigger, signals) = SignalListener::manual();
    let handle = tokio::spawn(app.run(signals));

    TestApp {
        addr,
        trigger,
        state,
        tasks,
        finished,
        handle,
    }
}

/// A client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
