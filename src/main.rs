use std::time::Instant;

use neuroswarm::digits::{self, DigitConfig, Glyph};
use neuroswarm::error::{Result, SimError};
use neuroswarm::record;
use neuroswarm::simulation::{SimConfig, Simulation};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first() else {
        print_help();
        return;
    };

    let rest = &args[1..];
    let outcome = match cmd.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "run" => run_headless(rest),
        "train" => run_train(rest),
        "recognize" => run_recognize(rest),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = outcome {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("neuroswarm (mobile spiking unit field)");
    println!("usage:");
    println!("  neuroswarm run [--units N] [--width W] [--height H] [--threshold T]");
    println!("                 [--steps N] [--seed S] [--quiet]");
    println!("  neuroswarm train <samples_dir> <record_out> [--steps N] [--seed S]");
    println!("  neuroswarm recognize <record> <glyph.json> [--steps N]");
    println!("  neuroswarm --help");
    println!();
    println!("samples_dir holds <digit>/<name>.json glyphs: {{\"width\":W,\"height\":H,\"pixels\":[..]}}");
}

/// Split `args` into positionals and `--flag value` pairs. `--quiet` takes no value.
struct Args {
    positional: Vec<String>,
    flags: Vec<(String, String)>,
    quiet: bool,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut quiet = false;

        let mut it = args.iter();
        while let Some(a) = it.next() {
            if a == "--quiet" {
                quiet = true;
            } else if let Some(name) = a.strip_prefix("--") {
                let value = it
                    .next()
                    .ok_or(SimError::InvalidConfig("flag is missing its value"))?;
                flags.push((name.to_string(), value.clone()));
            } else {
                positional.push(a.clone());
            }
        }
        Ok(Self {
            positional,
            flags,
            quiet,
        })
    }

    fn get<T: std::str::FromStr>(&self, name: &str, what: &'static str) -> Result<Option<T>> {
        match self.flags.iter().rev().find(|(k, _)| k == name) {
            Some((_, v)) => v.parse().map(Some).map_err(|_| SimError::InvalidConfig(what)),
            None => Ok(None),
        }
    }
}

fn run_headless(raw: &[String]) -> Result<()> {
    let args = Args::parse(raw)?;
    let defaults = SimConfig::default();

    let mut cfg = SimConfig {
        unit_count: args
            .get("units", "--units must be a number")?
            .unwrap_or(defaults.unit_count),
        width: args
            .get("width", "--width must be a number")?
            .unwrap_or(defaults.width),
        height: args
            .get("height", "--height must be a number")?
            .unwrap_or(defaults.height),
        connection_threshold: args
            .get("threshold", "--threshold must be a number")?
            .unwrap_or(defaults.connection_threshold),
        ..defaults
    };
    if let Some(seed) = args.get("seed", "--seed must be an integer")? {
        cfg = cfg.with_seed(seed);
    }
    let steps: Option<usize> = args.get("steps", "--steps must be an integer")?;

    let mut sim = Simulation::try_new(cfg)?;

    println!("=== neuroswarm (headless) ===");
    println!("units: {}", cfg.unit_count);
    println!("field: {}x{}", cfg.width, cfg.height);
    println!("connection threshold: {}", cfg.connection_threshold);
    println!();

    let started = Instant::now();
    let mut t: usize = 0;
    while steps.map_or(true, |limit| t < limit) {
        sim.step();
        t += 1;

        if t % 100 == 0 && !args.quiet {
            let d = sim.diagnostics();
            println!(
                "step={:6} synapses={:6} inactive={:6} firing={:4} avg_act={:.3}",
                d.step, d.active_synapses, d.inactive_synapses, d.firing_count, d.avg_activation
            );
        }
    }

    println!();
    println!(
        "done: {} steps in {:.3}s",
        t,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn digit_config(args: &Args) -> Result<DigitConfig> {
    let mut cfg = DigitConfig::default();
    if let Some(steps) = args.get("steps", "--steps must be an integer")? {
        cfg.train_steps = steps;
        cfg.recognize_steps = steps;
    }
    cfg.seed = args.get("seed", "--seed must be an integer")?;
    Ok(cfg)
}

fn run_train(raw: &[String]) -> Result<()> {
    let args = Args::parse(raw)?;
    let [samples_dir, out] = args.positional.as_slice() else {
        return Err(SimError::InvalidConfig(
            "usage: train <samples_dir> <record_out>",
        ));
    };
    let cfg = digit_config(&args)?;

    let samples = digits::load_sample_dir(samples_dir)?;
    info!(samples = samples.len(), dir = %samples_dir, "loaded training samples");

    let mut sim = Simulation::try_new(cfg.sim_config())?;
    let report = digits::train(&mut sim, &samples, &cfg)?;

    for (digit, n) in report.per_digit.iter().enumerate() {
        println!("digit {digit}: {n} samples");
    }
    record::save_file(&sim, out)?;
    println!("record saved to {out}");
    Ok(())
}

fn run_recognize(raw: &[String]) -> Result<()> {
    let args = Args::parse(raw)?;
    let [model, glyph_path] = args.positional.as_slice() else {
        return Err(SimError::InvalidConfig(
            "usage: recognize <record> <glyph.json>",
        ));
    };
    let cfg = digit_config(&args)?;

    let mut sim = record::load_file(model, cfg.sim_config())?;
    let glyph = Glyph::load(glyph_path)?;

    let result = digits::recognize(&mut sim, &glyph, cfg.recognize_steps)?;
    for (digit, a) in result.activations.iter().enumerate() {
        info!(digit, activation = a, "output unit");
    }
    println!("recognized: {}", result.digit);
    Ok(())
}
