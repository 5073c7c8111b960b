//! Probabilistic audit gate.
//!
//! The draw source is a trait so tests can pin it.

use rand::Rng;

/// Source of uniform draws in `[0, 1)`.
pub trait Sampler: Send + Sync {
    fn draw(&self) -> f64;

    /// Audit iff the draw is at or below `probability`.
    fn should_audit(&self, probability: f64) -> bool {
        self.draw() <= probability
    }
}

/// Thread-local RNG sampler used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn draw(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

/// Always returns the same draw.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl Sampler for FixedSampler {
    fn draw(&self) -> f64 {
        self.0
    }
}
