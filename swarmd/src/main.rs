//! neuroswarm daemon: keeps a simulation stepping in the background.
//!
//! Clients talk newline-delimited JSON over TCP (127.0.0.1:9877). The daemon owns
//! one `Simulation`, steps it at a target framerate while running, and persists a
//! full-state image to its data directory:
//! - Linux: ~/.local/share/neuroswarm/
//! - Windows: %APPDATA%\neuroswarm\
//! - MacOS: ~/Library/Application Support/neuroswarm/

use std::fs::File;
use std::io::{BufReader as StdBufReader, BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use neuroswarm::observer::{SimulationAdapter, SimulationSnapshot};
use neuroswarm::record;
use neuroswarm::simulation::{Diagnostics, SimConfig, Simulation};
use neuroswarm::synapse::UnitId;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, error, info, warn};

mod error;
mod paths;

use error::DaemonError;
use paths::AppPaths;

const LISTEN_ADDR: &str = "127.0.0.1:9877";

/// Upper bound on a single `Step` request so one client cannot stall the loop.
const MAX_MANUAL_STEPS: u32 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    GetSnapshot,
    Start,
    Stop,
    Step { count: u32 },
    ForceFire { unit: UnitId },
    SaveSimulation,
    LoadSimulation,
    ExportRecord,
    ResetSimulation,
    SetFramerate { fps: u32 },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(StateSummary),
    Snapshot(SimulationSnapshot),
    Success { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSummary {
    running: bool,
    frame: u64,
    target_fps: u32,
    config: SimConfig,
    diagnostics: Diagnostics,
    image_bytes: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon State
// ═══════════════════════════════════════════════════════════════════════════

struct DaemonState {
    sim: Simulation,
    cfg: SimConfig,
    running: bool,
    frame: u64,
    target_fps: u32,
    paths: AppPaths,
}

impl DaemonState {
    fn new(paths: AppPaths, cfg: SimConfig) -> Result<Self, DaemonError> {
        Ok(Self {
            sim: Simulation::try_new(cfg)?,
            cfg,
            running: false,
            frame: 0,
            target_fps: 60,
            paths,
        })
    }

    fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.sim.step();
        self.frame += 1;

        if self.frame % 1000 == 0 {
            let d = self.sim.diagnostics();
            debug!(
                step = d.step,
                synapses = d.active_synapses,
                firing = d.firing_count,
                "tick"
            );
        }
    }

    fn summary(&self) -> StateSummary {
        StateSummary {
            running: self.running,
            frame: self.frame,
            target_fps: self.target_fps,
            config: *self.sim.config(),
            diagnostics: self.sim.diagnostics(),
            image_bytes: self.sim.image_size_bytes().unwrap_or(0),
        }
    }

    fn save_simulation(&self) -> Result<PathBuf, DaemonError> {
        let path = self.paths.image_file();
        let mut w = BufWriter::new(File::create(&path)?);
        self.sim.save_image_to(&mut w)?;
        w.flush()?;
        info!(path = %path.display(), step = self.sim.current_step(), "simulation saved");
        Ok(path)
    }

    fn load_simulation(&mut self) -> Result<PathBuf, DaemonError> {
        let path = self.paths.image_file();
        if !path.exists() {
            return Err(DaemonError::NotFound(path));
        }
        let mut r = StdBufReader::new(File::open(&path)?);
        self.sim = Simulation::load_image_from(&mut r)?;
        self.cfg = *self.sim.config();
        info!(path = %path.display(), step = self.sim.current_step(), "simulation loaded");
        Ok(path)
    }

    fn export_record(&self) -> Result<PathBuf, DaemonError> {
        let path = self.paths.record_file();
        record::save_file(&self.sim, &path)?;
        Ok(path)
    }

    fn reset_simulation(&mut self) -> Result<(), DaemonError> {
        self.sim = Simulation::try_new(self.cfg)?;
        self.frame = 0;
        info!(units = self.cfg.unit_count, "simulation reset");
        Ok(())
    }
}

/// Read `config.json` from the data directory, falling back to defaults when absent.
fn load_config(paths: &AppPaths) -> Result<SimConfig, DaemonError> {
    let path = paths.config_file();
    if !path.exists() {
        return Ok(SimConfig::default());
    }
    let text = std::fs::read_to_string(&path)?;
    let cfg: SimConfig = serde_json::from_str(&text)?;
    cfg.validate().map_err(DaemonError::BadConfig)?;
    info!(path = %path.display(), "config loaded");
    Ok(cfg)
}

// ═══════════════════════════════════════════════════════════════════════════
// Request Handling
// ═══════════════════════════════════════════════════════════════════════════

fn success(message: impl Into<String>) -> Response {
    Response::Success {
        message: message.into(),
    }
}

fn failure(message: impl Into<String>) -> Response {
    Response::Error {
        message: message.into(),
    }
}

async fn handle_request(state: &RwLock<DaemonState>, request: Request) -> Response {
    match request {
        Request::GetState => Response::State(state.read().await.summary()),
        Request::GetSnapshot => {
            let s = state.read().await;
            Response::Snapshot(SimulationAdapter::new(&s.sim).snapshot())
        }
        Request::Start => {
            state.write().await.running = true;
            success("Started")
        }
        Request::Stop => {
            let mut s = state.write().await;
            s.running = false;
            // Persist on explicit stop.
            match s.save_simulation() {
                Ok(_) => success("Stopped and saved"),
                Err(e) => failure(format!("Stopped but save failed: {e}")),
            }
        }
        Request::Step { count } => {
            let count = count.clamp(1, MAX_MANUAL_STEPS);
            let mut s = state.write().await;
            s.sim.run(count as usize);
            success(format!(
                "Stepped {count} (now at step {})",
                s.sim.current_step()
            ))
        }
        Request::ForceFire { unit } => {
            let mut s = state.write().await;
            let now = s.sim.current_step();
            match s.sim.force_fire(unit, now) {
                Ok(()) => success(format!("Unit {unit} fired")),
                Err(e) => failure(e.to_string()),
            }
        }
        Request::SaveSimulation => match state.read().await.save_simulation() {
            Ok(path) => success(format!("Simulation saved to {}", path.display())),
            Err(e) => failure(e.to_string()),
        },
        Request::LoadSimulation => match state.write().await.load_simulation() {
            Ok(path) => success(format!("Simulation loaded from {}", path.display())),
            Err(e) => failure(e.to_string()),
        },
        Request::ExportRecord => match state.read().await.export_record() {
            Ok(path) => success(format!("Record exported to {}", path.display())),
            Err(e) => failure(e.to_string()),
        },
        Request::ResetSimulation => match state.write().await.reset_simulation() {
            Ok(()) => success("Simulation reset"),
            Err(e) => failure(e.to_string()),
        },
        Request::SetFramerate { fps } => {
            let clamped = fps.clamp(1, 1000);
            state.write().await.target_fps = clamped;
            info!(fps = clamped, "framerate changed");
            success(format!("Framerate set to {clamped} FPS"))
        }
        Request::Shutdown => match state.read().await.save_simulation() {
            Ok(_) => {
                info!("shutdown requested; simulation saved");
                tokio::spawn(async {
                    // Let the response flush before exiting.
                    time::sleep(Duration::from_millis(50)).await;
                    std::process::exit(0);
                });
                success("Shutting down")
            }
            Err(e) => failure(format!("Save failed, aborting shutdown: {e}")),
        },
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(&state, request).await,
            Err(e) => failure(format!("Invalid request: {e}")),
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt::init();

    let paths = AppPaths::new()?;
    info!(dir = %paths.data_dir().display(), "data directory");

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("ignoring config file: {e}");
            SimConfig::default()
        }
    };
    let state = Arc::new(RwLock::new(DaemonState::new(paths, cfg)?));

    // Save on Ctrl-C so state persists even if the daemon is stopped abruptly.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                match state.read().await.save_simulation() {
                    Ok(_) => info!("Ctrl-C: simulation saved"),
                    Err(e) => error!("Ctrl-C save failed: {e}"),
                }
                std::process::exit(0);
            }
        });
    }

    {
        let mut s = state.write().await;
        if let Err(e) = s.load_simulation() {
            warn!("could not load simulation: {e}");
            info!(units = s.cfg.unit_count, "starting with a fresh simulation");
        }
    }

    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    info!("swarmd listening on {LISTEN_ADDR}");

    // Step loop: one step per frame while running, holding the write lock for the whole step.
    let loop_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let target_fps = loop_state.read().await.target_fps;
            let frame_millis = u64::from((1000 / target_fps).max(1));
            time::sleep(Duration::from_millis(frame_millis)).await;

            loop_state.write().await.tick();
        }
    });

    loop {
        let (stream, addr) = listener.accept().await?;
        info!(%addr, "client connected");
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state).await {
                error!("client handler error: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(name: &str) -> AppPaths {
        let dir = std::env::temp_dir().join(format!("swarmd-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        AppPaths::at(dir).unwrap()
    }

    fn state(name: &str) -> RwLock<DaemonState> {
        let cfg = SimConfig::new(12, 100.0, 100.0, 30.0).with_seed(5);
        RwLock::new(DaemonState::new(temp_paths(name), cfg).unwrap())
    }

    #[test]
    fn requests_use_tagged_json() {
        let req: Request = serde_json::from_str(r#"{"type":"Step","count":3}"#).unwrap();
        assert!(matches!(req, Request::Step { count: 3 }));

        let resp = serde_json::to_string(&success("ok")).unwrap();
        assert_eq!(resp, r#"{"type":"Success","message":"ok"}"#);
    }

    #[test]
    fn tick_only_advances_while_running() {
        let mut s = state("tick").into_inner();
        s.tick();
        assert_eq!(s.sim.current_step(), 0);

        s.running = true;
        s.tick();
        s.tick();
        assert_eq!(s.frame, 2);
        assert_eq!(s.sim.current_step(), 2);
    }

    #[tokio::test]
    async fn step_request_advances_simulation() {
        let s = state("step");
        let resp = handle_request(&s, Request::Step { count: 7 }).await;
        assert!(matches!(resp, Response::Success { .. }));
        assert_eq!(s.read().await.sim.current_step(), 7);
    }

    #[tokio::test]
    async fn force_fire_out_of_range_is_an_error() {
        let s = state("fire");
        let resp = handle_request(&s, Request::ForceFire { unit: 99 }).await;
        assert!(matches!(resp, Response::Error { .. }));

        let resp = handle_request(&s, Request::ForceFire { unit: 3 }).await;
        assert!(matches!(resp, Response::Success { .. }));
        assert!(s.read().await.sim.units()[3].is_firing());
    }

    #[tokio::test]
    async fn save_then_load_restores_step() {
        let s = state("persist");
        handle_request(&s, Request::Step { count: 25 }).await;
        assert!(matches!(
            handle_request(&s, Request::SaveSimulation).await,
            Response::Success { .. }
        ));

        handle_request(&s, Request::ResetSimulation).await;
        assert_eq!(s.read().await.sim.current_step(), 0);

        assert!(matches!(
            handle_request(&s, Request::LoadSimulation).await,
            Response::Success { .. }
        ));
        assert_eq!(s.read().await.sim.current_step(), 25);
    }

    #[tokio::test]
    async fn load_without_image_reports_missing_file() {
        let s = state("missing");
        match handle_request(&s, Request::LoadSimulation).await {
            Response::Error { message } => assert!(message.contains("not found")),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn export_record_writes_weights_file() {
        let s = state("export");
        handle_request(&s, Request::Step { count: 40 }).await;
        handle_request(&s, Request::ExportRecord).await;

        let path = s.read().await.paths.record_file();
        let sim = record::load_file(&path, SimConfig::default()).unwrap();
        assert_eq!(sim.unit_count(), 12);
    }

    #[tokio::test]
    async fn framerate_is_clamped() {
        let s = state("fps");
        handle_request(&s, Request::SetFramerate { fps: 0 }).await;
        assert_eq!(s.read().await.target_fps, 1);
        handle_request(&s, Request::SetFramerate { fps: 5000 }).await;
        assert_eq!(s.read().await.target_fps, 1000);
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let paths = temp_paths("cfg-default");
        assert_eq!(load_config(&paths).unwrap(), SimConfig::default());
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let paths = temp_paths("cfg-bad");
        let mut cfg = SimConfig::default();
        cfg.width = -1.0;
        std::fs::write(paths.config_file(), serde_json::to_string(&cfg).unwrap()).unwrap();
        assert!(matches!(
            load_config(&paths),
            Err(DaemonError::BadConfig(_))
        ));
    }
}
