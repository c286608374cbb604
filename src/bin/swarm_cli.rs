//! CLI client for the `swarmd` daemon.
//!
//! Examples:
//!   swarm-cli status
//!   swarm-cli start
//!   swarm-cli step 100
//!   swarm-cli fire 12
//!   swarm-cli snapshot
//!   swarm-cli save
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use neuroswarm::observer::SimulationSnapshot;
use neuroswarm::simulation::{Diagnostics, SimConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    GetSnapshot,
    Start,
    Stop,
    Step { count: u32 },
    ForceFire { unit: usize },
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
    #[serde(default)]
    target_fps: u32,
    config: SimConfig,
    diagnostics: Diagnostics,
    #[serde(default)]
    image_bytes: usize,
}

fn usage() -> ! {
    eprintln!("swarm-cli (talks to swarmd @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: swarm-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show daemon state");
    eprintln!("  snapshot                    Dump the full unit/synapse snapshot as JSON");
    eprintln!("  start | stop                Control the step loop (stop also saves)");
    eprintln!("  step <n>                    Run n steps now");
    eprintln!("  fire <unit>                 Force a unit to fire");
    eprintln!("  save | load | reset         Simulation image controls");
    eprintln!("  export                      Write the synapse record");
    eprintln!("  fps <1-1000>                Set the step rate");
    eprintln!("  shutdown                    Save and exit daemon");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn print_state(s: StateSummary) {
    let d = s.diagnostics;
    println!(
        "running={} frame={} fps={} step={} image={}B",
        s.running, s.frame, s.target_fps, d.step, s.image_bytes
    );
    println!(
        "units={} synapses={} inactive={} firing={} avg_act={:.3} avg_v={:.2}",
        d.unit_count,
        d.active_synapses,
        d.inactive_synapses,
        d.firing_count,
        d.avg_activation,
        d.avg_potential,
    );
    println!(
        "field={}x{} threshold={} chance={}",
        s.config.width, s.config.height, s.config.connection_threshold, s.config.activation_chance
    );
}

fn parse_number<T: std::str::FromStr>(args: &[String], what: &str) -> T {
    let Some(raw) = args.get(1) else { usage() };
    raw.parse().unwrap_or_else(|_| {
        eprintln!("{what}");
        process::exit(1);
    })
}

fn main() {
    let (addr, args) = parse_args();

    let req = match args[0].as_str() {
        "status" => Request::GetState,
        "snapshot" => Request::GetSnapshot,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "step" => Request::Step {
            count: parse_number(&args, "step count must be a number"),
        },
        "fire" => Request::ForceFire {
            unit: parse_number(&args, "unit must be an index"),
        },
        "save" => Request::SaveSimulation,
        "load" => Request::LoadSimulation,
        "reset" => Request::ResetSimulation,
        "export" => Request::ExportRecord,
        "fps" => Request::SetFramerate {
            fps: parse_number(&args, "fps must be a number (1-1000)"),
        },
        "shutdown" => Request::Shutdown,
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::State(s)) => print_state(s),
        Ok(Response::Snapshot(snap)) => match serde_json::to_string_pretty(&snap) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed: {e}");
                process::exit(1);
            }
        },
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
