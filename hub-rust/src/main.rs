//! main.rs — MyoMeet hub entry point
//!
//! Runs three concurrent pieces:
//!   1. UDP listener: armband links → event queue
//!   2. Tick loop: drains the queue, ticks the handshake engine, sends feedback
//!   3. HTTP server: /health, /status (device table), /ws (live handshake notices)
//!
//! Only the tick loop touches gesture state. With `--replay` none of this starts:
//! the recording is run through a fresh engine and the handshakes are printed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use armband_types::{DeviceCommand, HubEvent};
use meet_hub::feedback::FeedbackLink;
use meet_hub::hub::{self, Inbound};
use meet_hub::replay;
use meet_hub::{DetectorConfig, DeviceStatus, DisconnectPolicy, EventConsumer, HandshakeEngine, HubConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "meet-hub", about = "MyoMeet two-armband handshake hub")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// UDP port for armband links (overrides config/env)
    #[arg(long)]
    udp_port: Option<u16>,
    /// HTTP port for /health, /status and /ws
    #[arg(long)]
    ctrl_port: Option<u16>,
    /// What a disconnect does to an armband's gesture state
    #[arg(long, value_enum)]
    disconnect_policy: Option<DisconnectPolicy>,
    /// Run a JSON-lines event recording offline and exit
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Serialize)]
struct HubStatus {
    ticks: u64,
    handshakes: u64,
    devices: Vec<DeviceStatus>,
}

type SharedStatus = Arc<RwLock<HubStatus>>;
type NoticeTx = broadcast::Sender<String>;

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meet_hub=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut cfg = DetectorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(p) = args.udp_port {
        cfg.hub.udp_port = p;
    }
    if let Some(p) = args.ctrl_port {
        cfg.hub.ctrl_port = p;
    }
    if let Some(policy) = args.disconnect_policy {
        cfg.disconnect_policy = policy;
    }

    if let Some(path) = args.replay {
        let summary = replay::replay_file(&path, &cfg)?;
        for hs in &summary.handshakes {
            println!("{}", serde_json::to_string(hs)?);
        }
        return Ok(());
    }

    info!(
        "🤝 MyoMeet hub starting — {} ms tick, disconnect policy {:?}",
        cfg.hub.tick_ms, cfg.disconnect_policy
    );

    let socket = hub::bind(cfg.hub.udp_port)
        .await
        .with_context(|| format!("binding UDP port {}", cfg.hub.udp_port))?;

    let (event_tx, event_rx) = mpsc::channel::<Inbound>(cfg.hub.event_queue);
    let (notice_tx, _) = broadcast::channel::<String>(64);
    let status: SharedStatus = Arc::new(RwLock::new(HubStatus::default()));

    tokio::spawn(hub::run_listener(socket.clone(), event_tx));

    let engine = HandshakeEngine::new(&cfg);
    let feedback = FeedbackLink::new(socket, notice_tx.clone());
    tokio::spawn(tick_loop(engine, event_rx, feedback, status.clone(), cfg.hub.clone()));

    let ctrl_addr = format!("0.0.0.0:{}", cfg.hub.ctrl_port);
    info!("🖥  Status at http://{ctrl_addr}/status, handshakes at ws://{ctrl_addr}/ws");

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/status", get(status_handler))
        .route("/health", get(|| async { "meet-hub ok" }))
        .with_state((status, notice_tx))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&ctrl_addr)
        .await
        .with_context(|| format!("binding {ctrl_addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

/// Fixed-cadence driver: deliver this tick's events, then tick, then feed back.
async fn tick_loop(
    mut engine: HandshakeEngine,
    mut events: mpsc::Receiver<Inbound>,
    mut feedback: FeedbackLink,
    status: SharedStatus,
    cfg: HubConfig,
) {
    let mut ticker = interval(Duration::from_millis(cfg.tick_ms));
    // A late tick is run late, never doubled up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut handshakes_total = 0u64;

    info!("⏱ Tick loop running every {} ms", cfg.tick_ms);

    loop {
        ticker.tick().await;

        loop {
            match events.try_recv() {
                Ok(inbound) => deliver(&mut engine, &mut feedback, inbound).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!("Event queue closed, tick loop stopping");
                    return;
                }
            }
        }

        let matches = engine.tick();
        for hs in &matches {
            feedback.handshake(engine.registry(), hs).await;
        }
        handshakes_total += matches.len() as u64;

        if engine.ticks() % cfg.status_every_ticks.max(1) == 0 {
            let mut s = status.write().await;
            s.ticks = engine.ticks();
            s.handshakes = handshakes_total;
            s.devices = engine.snapshot();
        }
    }
}

async fn deliver(engine: &mut HandshakeEngine, feedback: &mut FeedbackLink, inbound: Inbound) {
    let Inbound { event, src } = inbound;
    let handle = event.handle();
    let wants_unlock = matches!(event, HubEvent::Paired { .. } | HubEvent::Connected { .. });

    if let Err(e) = engine.consume(event) {
        warn!("Dropped event from {src}: {e}");
        return;
    }
    if let Some(handle) = handle {
        feedback.learn(handle, src);
        if wants_unlock {
            feedback.send(handle, DeviceCommand::Unlock { hold: true }).await;
        }
    }
}

// ── HTTP / WebSocket ──────────────────────────────────────────────────────────

async fn status_handler(State((status, _)): State<(SharedStatus, NoticeTx)>) -> Json<HubStatus> {
    Json(status.read().await.clone())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State((status, notice_tx)): State<(SharedStatus, NoticeTx)>,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, status, notice_tx))
}

async fn handle_ws(mut socket: WebSocket, status: SharedStatus, notice_tx: NoticeTx) {
    let mut notices = notice_tx.subscribe();

    // Current device table first, then live notices
    let snapshot = serde_json::json!({ "type": "status", "data": &*status.read().await });
    if socket.send(Message::Text(snapshot.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = notices.recv() => match msg {
                Ok(json) => {
                    if socket.send(Message::Text(json)).await.is_err() { break; }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("ws client lagged, skipped {n} notices"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
