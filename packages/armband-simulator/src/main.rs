//! main.rs — Armband simulator entry point
//!
//! Runs two concurrent pieces:
//!   1. Sim loop: every tick, applies hub commands, steps the wearers and sends their
//!      device events to the hub over UDP (optionally recording them)
//!   2. Control server: /health and a /ws control panel (pause, resume, preset, reset)
//!      that also streams wearer telemetry

mod link;
mod scenarios;
mod wearer_sim;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use link::{ArmbandLink, Recorder};
use scenarios::Scenario;
use wearer_sim::{MotionConfig, WearerSim};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "armband-sim", about = "MyoMeet synthetic armband fleet")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Hub UDP address
    #[arg(long, default_value = "127.0.0.1:7000")]
    hub_addr: String,
    /// Scenario preset (meet, mismatch, weak, crowd, dropout)
    #[arg(long)]
    preset: Option<String>,
    /// Control panel port
    #[arg(long, default_value = "9090")]
    ctrl_port: u16,
    /// Also write every sent event to this JSON-lines file (replayable by the hub)
    #[arg(long, value_name = "FILE")]
    record: Option<PathBuf>,
    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,
    /// Report poses without waiting for the hub to unlock the armbands
    #[arg(long)]
    unlocked: bool,
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FullConfig {
    simulation: SimulationConfig,
    motion: MotionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SimulationConfig {
    tick_ms: u64,
    preset: String,
    telemetry_every_ticks: u64,
    seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { tick_ms: 10, preset: "meet".into(), telemetry_every_ticks: 10, seed: None }
    }
}

fn load_config(path: &Path) -> Result<FullConfig> {
    let src = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => include_str!("../config.toml").to_string(),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    toml::from_str(&src).with_context(|| format!("parsing {}", path.display()))
}

fn scenario_named(name: &str) -> Result<Scenario> {
    scenarios::preset(name)
        .ok_or_else(|| anyhow!("unknown preset '{name}' (expected one of {})", scenarios::PRESETS.join(", ")))
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct SimState {
    sim: WearerSim,
    scenario: Scenario,
    motion: MotionConfig,
    seed: Option<u64>,
    paused: bool,
    /// Latest telemetry, sent to control clients on connect
    last_telemetry: Option<String>,
}

impl SimState {
    fn load(&mut self, scenario: Scenario) {
        self.sim = WearerSim::new(&scenario, &self.motion, self.seed);
        self.scenario = scenario;
    }
}

type SharedState = Arc<RwLock<SimState>>;
type TelemetryTx = broadcast::Sender<String>;

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "armband_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = load_config(&args.config)?;
    if let Some(p) = args.preset {
        cfg.simulation.preset = p;
    }
    if args.seed.is_some() {
        cfg.simulation.seed = args.seed;
    }
    if args.unlocked {
        cfg.motion.start_unlocked = true;
    }
    if let Some(ms) = std::env::var("MEET_TICK_MS").ok().and_then(|v| v.parse().ok()) {
        cfg.simulation.tick_ms = ms;
    }

    let scenario = scenario_named(&cfg.simulation.preset)?;
    info!(
        "💪 Armband simulator starting — preset '{}', {} wearers, {} ms tick → {}",
        scenario.name,
        scenario.wearers.len(),
        cfg.simulation.tick_ms,
        args.hub_addr
    );

    let recorder = match &args.record {
        Some(path) => Some(Recorder::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => None,
    };
    let link = ArmbandLink::new(&args.hub_addr, recorder).context("binding UDP socket")?;
    if let Ok(port) = link.local_port() {
        info!("📡 Armband link on UDP port {port}");
    }

    let shared: SharedState = Arc::new(RwLock::new(SimState {
        sim: WearerSim::new(&scenario, &cfg.motion, cfg.simulation.seed),
        scenario,
        motion: cfg.motion.clone(),
        seed: cfg.simulation.seed,
        paused: false,
        last_telemetry: None,
    }));

    let (telem_tx, _) = broadcast::channel::<String>(64);

    tokio::spawn(sim_loop(shared.clone(), link, telem_tx.clone(), cfg.simulation.clone()));

    let ctrl_addr = format!("0.0.0.0:{}", args.ctrl_port);
    info!("🖥  Control panel WebSocket at ws://{ctrl_addr}/ws");

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "armband-sim ok" }))
        .with_state((shared, telem_tx))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&ctrl_addr)
        .await
        .with_context(|| format!("binding {ctrl_addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Sim loop ──────────────────────────────────────────────────────────────────

async fn sim_loop(state: SharedState, mut link: ArmbandLink, telem: TelemetryTx, cfg: SimulationConfig) {
    let mut ticker = interval(Duration::from_millis(cfg.tick_ms.max(1)));
    let every = cfg.telemetry_every_ticks.max(1);

    info!("⏱ Sim loop running every {} ms", cfg.tick_ms);

    loop {
        ticker.tick().await;

        let commands = link.poll_commands();

        let (events, telemetry) = {
            let mut s = state.write().await;
            if s.paused {
                continue;
            }
            for cmd in &commands {
                if !s.sim.apply(cmd) {
                    warn!("Command for unknown or offline armband {}: {:?}", cmd.handle, cmd.command);
                }
            }
            let events = s.sim.step();
            let telemetry = (s.sim.tick % every == 0).then(|| {
                serde_json::json!({
                    "type": "telemetry",
                    "tick": s.sim.tick,
                    "preset": s.scenario.name,
                    "wearers": s.sim.snapshot(),
                })
                .to_string()
            });
            if let Some(t) = &telemetry {
                s.last_telemetry = Some(t.clone());
            }
            (events, telemetry)
        };

        link.send_all(events);
        link.end_tick();

        if let Some(t) = telemetry {
            let _ = telem.send(t);
        }
    }
}

// ── WebSocket control handler ─────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State((state, telem_tx)): State<(SharedState, TelemetryTx)>,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state, telem_tx))
}

async fn handle_ws(mut socket: WebSocket, state: SharedState, telem_tx: TelemetryTx) {
    let mut telem_rx = telem_tx.subscribe();

    let (last, scenario_json) = {
        let s = state.read().await;
        (s.last_telemetry.clone(), serde_json::to_value(&s.scenario).unwrap_or_default())
    };
    if let Some(t) = last {
        let _ = socket.send(Message::Text(t)).await;
    }
    let hello = serde_json::json!({ "type": "scenario", "data": scenario_json, "presets": scenarios::PRESETS });
    let _ = socket.send(Message::Text(hello.to_string())).await;

    loop {
        tokio::select! {
            Ok(msg) = telem_rx.recv() => {
                if socket.send(Message::Text(msg)).await.is_err() { break; }
            }
            Some(Ok(Message::Text(cmd))) = socket.recv() => {
                handle_command(&state, &cmd).await;
            }
            else => break,
        }
    }
}

/// Control commands are JSON: `{ "cmd": "...", "args": {...} }`
async fn handle_command(state: &SharedState, raw: &str) {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return,
    };
    let cmd = v["cmd"].as_str().unwrap_or("");
    match cmd {
        "pause" => {
            state.write().await.paused = true;
            info!("⏸ Sim paused");
        }
        "resume" => {
            state.write().await.paused = false;
            info!("▶ Sim resumed");
        }
        "reset" => {
            let mut s = state.write().await;
            let scenario = s.scenario.clone();
            s.load(scenario);
            info!("↺ Sim reset");
        }
        "preset" => {
            let name = v["args"]["name"].as_str().unwrap_or("");
            match scenario_named(name) {
                Ok(sc) => {
                    state.write().await.load(sc);
                    info!("🎭 Preset '{name}' loaded");
                }
                Err(e) => warn!("{e}"),
            }
        }
        _ => warn!("Unknown control command: {cmd}"),
    }
}
