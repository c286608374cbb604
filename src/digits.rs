//! Digit training and recognition on top of the simulation.
//!
//! The network is laid out as an input layer of `INPUT_SIDE × INPUT_SIDE` units
//! (one per pixel, row-major) followed by `DIGIT_COUNT` output units, one per digit.
//! Both drivers only use the simulation's public contract: inject firing with
//! `force_fire`, run steps, and read activation levels.
//!
//! Glyphs arrive already decoded as grayscale ink intensities in `0..=1`
//! (1 = ink). Sample sets are stored on disk as JSON, one glyph per file, under
//! `<root>/<digit>/`.

#[cfg(feature = "serde")]
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SimError};
use crate::simulation::{SimConfig, Simulation};

pub const INPUT_SIDE: usize = 28;
pub const INPUT_UNITS: usize = INPUT_SIDE * INPUT_SIDE;
pub const DIGIT_COUNT: usize = 10;

/// Pixels with more ink than this fire their input unit.
pub const INK_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigitConfig {
    pub sim_width: f64,
    pub sim_height: f64,
    pub connection_threshold: f64,
    /// Steps run after presenting each training sample.
    pub train_steps: usize,
    /// Steps run after presenting a glyph before reading the output layer.
    pub recognize_steps: usize,
    pub seed: Option<u64>,
}

impl Default for DigitConfig {
    fn default() -> Self {
        Self {
            sim_width: 1000.0,
            sim_height: 800.0,
            connection_threshold: 150.0,
            train_steps: 1000,
            recognize_steps: 100,
            seed: None,
        }
    }
}

impl DigitConfig {
    /// Simulation config for the full input + output layout.
    pub fn sim_config(&self) -> SimConfig {
        let cfg = SimConfig::new(
            INPUT_UNITS + DIGIT_COUNT,
            self.sim_width,
            self.sim_height,
            self.connection_threshold,
        );
        match self.seed {
            Some(seed) => cfg.with_seed(seed),
            None => cfg,
        }
    }
}

/// A grayscale image, row-major, ink intensity per pixel.
///
/// Always non-empty with `pixels.len() == width * height`; deserialization goes
/// through the same check as [`Glyph::new`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "GlyphFile"))]
pub struct Glyph {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

/// On-disk glyph shape before validation.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct GlyphFile {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

#[cfg(feature = "serde")]
impl TryFrom<GlyphFile> for Glyph {
    type Error = SimError;

    fn try_from(f: GlyphFile) -> Result<Self> {
        Glyph::new(f.width, f.height, f.pixels)
    }
}

impl Glyph {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || pixels.len() != width * height {
            return Err(SimError::EmptyGlyph);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn ink(&self, x: usize, y: usize) -> f32 {
        self.pixels[y * self.width + x]
    }

    /// Nearest-neighbour rescale to `width × height`.
    pub fn resample(&self, width: usize, height: usize) -> Glyph {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let x_ratio = self.width as f64 / width as f64;
        let y_ratio = self.height as f64 / height as f64;

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            let sy = ((y as f64 * y_ratio) as usize).min(self.height - 1);
            for x in 0..width {
                let sx = ((x as f64 * x_ratio) as usize).min(self.width - 1);
                pixels.push(self.ink(sx, sy));
            }
        }
        Glyph {
            width,
            height,
            pixels,
        }
    }

    #[cfg(feature = "serde")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub digit: usize,
    pub glyph: Glyph,
}

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Samples used per digit.
    pub per_digit: [usize; DIGIT_COUNT],
    pub steps_run: usize,
}

impl TrainReport {
    pub fn total(&self) -> usize {
        self.per_digit.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub digit: usize,
    pub activations: [f64; DIGIT_COUNT],
}

/// Fire the input unit of every inked pixel at the simulation's current step.
/// The glyph is rescaled to the input layer first. Returns how many units fired.
pub fn present_glyph(sim: &mut Simulation, glyph: &Glyph) -> Result<usize> {
    let glyph = glyph.resample(INPUT_SIDE, INPUT_SIDE);
    let now = sim.current_step();
    let mut fired = 0;

    for y in 0..INPUT_SIDE {
        for x in 0..INPUT_SIDE {
            let idx = y * INPUT_SIDE + x;
            if idx >= sim.unit_count() {
                continue;
            }
            if glyph.ink(x, y) > INK_THRESHOLD {
                sim.force_fire(idx, now)?;
                fired += 1;
            }
        }
    }
    Ok(fired)
}

/// Present one labelled sample: inject the glyph, fire the label's output unit, then
/// let the network run for `cfg.train_steps`.
pub fn train_sample(sim: &mut Simulation, sample: &Sample, cfg: &DigitConfig) -> Result<()> {
    if sample.digit >= DIGIT_COUNT {
        return Err(SimError::InvalidLabel(sample.digit));
    }
    let fired = present_glyph(sim, &sample.glyph)?;

    let output = INPUT_UNITS + sample.digit;
    if output < sim.unit_count() {
        sim.force_fire(output, sim.current_step())?;
    }

    for step in 0..cfg.train_steps {
        sim.step();
        if step % 100 == 0 {
            debug!(
                digit = sample.digit,
                progress = step * 100 / cfg.train_steps.max(1),
                "training"
            );
        }
    }
    debug!(digit = sample.digit, inputs_fired = fired, "sample done");
    Ok(())
}

pub fn train<'a, I>(sim: &mut Simulation, samples: I, cfg: &DigitConfig) -> Result<TrainReport>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut report = TrainReport::default();
    for sample in samples {
        train_sample(sim, sample, cfg)?;
        report.per_digit[sample.digit] += 1;
        report.steps_run += cfg.train_steps;
    }
    info!(
        samples = report.total(),
        synapses = sim.total_active_synapses(),
        "training finished"
    );
    Ok(report)
}

/// Present a glyph, run `steps`, and pick the output unit with the highest activation.
///
/// The output layer is the last `DIGIT_COUNT` units. Ties go to the lower digit.
pub fn recognize(sim: &mut Simulation, glyph: &Glyph, steps: usize) -> Result<Recognition> {
    if sim.unit_count() < DIGIT_COUNT {
        return Err(SimError::OutputLayerTooSmall {
            needed: DIGIT_COUNT,
            available: sim.unit_count(),
        });
    }

    present_glyph(sim, glyph)?;
    sim.run(steps);

    let mut activations = [0.0; DIGIT_COUNT];
    for (slot, unit) in activations.iter_mut().zip(sim.tail_units(DIGIT_COUNT)) {
        *slot = unit.activation_level();
    }

    let mut digit = 0;
    for (i, &a) in activations.iter().enumerate() {
        if a > activations[digit] {
            digit = i;
        }
    }

    Ok(Recognition { digit, activations })
}

/// Load every `*.json` glyph under `<root>/<digit>/` for digits 0..=9, in digit order
/// and then file-name order. Missing digit directories are skipped with a warning;
/// unreadable glyphs are skipped too.
#[cfg(feature = "serde")]
pub fn load_sample_dir(root: impl AsRef<Path>) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    let mut samples = Vec::new();

    for digit in 0..DIGIT_COUNT {
        let dir = root.join(digit.to_string());
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "training directory missing");
            continue;
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            match Glyph::load(&path) {
                Ok(glyph) => samples.push(Sample { digit, glyph }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping glyph"),
            }
        }
    }
    Ok(samples)
}
