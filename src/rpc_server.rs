//! Markboard RPC Server: JSON-RPC over stdin/stdout for a thin UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmark.add", "params":{"url":"...","title":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Event:    {"event":"bookmarks.changed", "items":[...]}
//!
//! Usage: `markboard-rpc [config.json]`. Logs go to stderr.

use std::sync::Arc;
use std::time::{Duration, Instant};

use markboard::app::Dashboard;
use markboard::rpc_handler::{build_backend, handle_method};
use markboard::services::config_engine::{ConfigEngine, ConfigEngineTrait};
use markboard::types::view::Route;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Simple rate limiter: max requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

/// Writes every outgoing line from one task so responses and events never interleave.
async fn write_lines(mut lines: mpsc::UnboundedReceiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        let mut text = line.to_string();
        text.push('\n');
        if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            break;
        }
    }
}

fn init_logging(fallback_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let mut engine = ConfigEngine::new(std::env::args().nth(1));
    let config = match engine.load().and_then(|_| engine.apply_env_overrides()) {
        Ok(()) => engine.get_config().clone(),
        Err(e) => {
            eprintln!("markboard: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_filter);
    info!(config = %engine.get_config_path(), "starting markboard rpc server");

    let backend = match build_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "could not initialize backend");
            std::process::exit(1);
        }
    };

    let (out, out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(write_lines(out_rx));

    let nav_out = out.clone();
    let navigator = move |route: Route| {
        let _ = nav_out.send(json!({"event": "navigate", "route": route.path()}));
    };
    let dashboard = Arc::new(Dashboard::with_realtime(
        backend,
        Arc::new(navigator),
        &config.realtime,
    ));

    // Push state changes to the shell as events.
    let mut bookmarks = dashboard.watch_bookmarks();
    let events = out.clone();
    tokio::spawn(async move {
        while bookmarks.changed().await.is_ok() {
            let items = bookmarks.borrow_and_update().clone();
            if events.send(json!({"event": "bookmarks.changed", "items": items})).is_err() {
                break;
            }
        }
    });
    let mut view = dashboard.watch_view();
    let events = out.clone();
    tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let state = *view.borrow_and_update();
            if events.send(json!({"event": "view.state", "state": state})).is_err() {
                break;
            }
        }
    });

    let _ = out.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

    // Max 200 RPC requests per second.
    let mut rate_limiter = RateLimiter::new(200);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };

        let id = req.get("id").cloned().unwrap_or(Value::Null);
        if !rate_limiter.check() {
            let _ = out.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = req.get("params").cloned().unwrap_or(json!({}));
        debug!(method = %method, "rpc request");

        // Requests run concurrently so a slow mount does not block logout.
        let dashboard = dashboard.clone();
        let out = out.clone();
        tokio::spawn(async move {
            let response = match handle_method(&dashboard, &method, &params).await {
                Ok(val) => json!({"id": id, "result": val}),
                Err(err) => json!({"id": id, "error": err}),
            };
            let _ = out.send(response);
        });
    }

    info!("stdin closed; shutting down");
    dashboard.teardown();
    drop(dashboard);
    drop(out);
    let _ = tokio::time::timeout(Duration::from_secs(2), writer).await;
}
