// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// One instance is owned by each Simulation and threaded through construction and every
// step, so a seeded run is fully reproducible.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

const ZERO_STATE_REPLACEMENT: u64 = 0x9E3779B97F4A7C15;

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 {
            ZERO_STATE_REPLACEMENT
        } else {
            seed
        };
        Self { state: seed }
    }

    /// Seed from the wall clock. Used once per simulation when no seed is configured.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(ZERO_STATE_REPLACEMENT);
        // Spread low-entropy clock bits over the whole word before the first draw.
        Self::new(nanos.wrapping_mul(0x2545F4914F6CDD1D) ^ (nanos >> 29))
    }

    pub(crate) fn from_state(state: u64) -> Self {
        Self::new(state)
    }

    pub(crate) fn state(&self) -> u64 {
        self.state
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1) with 53 bits of precision.
    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    /// Bernoulli draw: true with probability `p`.
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.next_f64_01() < p
    }

    /// Normal sample via Box–Muller. Each call consumes two uniforms and discards the
    /// sine branch, so draws at different call sites never share state.
    pub fn gen_normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_f64_01();
        let u2 = self.next_f64_01();
        let r = (-2.0 * u1.ln()).sqrt();
        mean + std_dev * r * (2.0 * core::f64::consts::PI * u2).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Prng::new(42);
        let mut b = Prng::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rng = Prng::new(7);
        for _ in 0..10_000 {
            let x = rng.next_f64_01();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn normal_has_roughly_expected_moments() {
        let mut rng = Prng::new(99);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| rng.gen_normal(0.0, 0.1)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;

        assert!(mean.abs() < 0.01, "mean={mean}");
        assert!((var.sqrt() - 0.1).abs() < 0.01, "std={}", var.sqrt());
    }

    #[test]
    fn zero_seed_is_not_stuck() {
        let mut rng = Prng::new(0);
        assert_ne!(rng.next_u32(), rng.next_u32());
    }
}
