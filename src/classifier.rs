use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use crate::recognizer::Recognizer;
use crate::registry::Registry;

/// Lines drawn per sampling round.
pub const SAMPLE_SIZE: usize = 10;
/// Tally a general recognizer must exceed to be accepted.
pub const TALLY_THRESHOLD: usize = SAMPLE_SIZE / 4;
/// Rounds after which a file is declared unclassifiable.
pub const MAX_ROUNDS: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("file has no lines")]
    Empty,
    #[error("no recognizer accepted the file after {rounds} sampling rounds")]
    NoConvergence { rounds: usize },
}

/// Picks the recognizer for a file by repeated random sampling of its lines.
pub struct Classifier<'r, R = StdRng> {
    registry: &'r Registry,
    rng: R,
    max_rounds: usize,
}

impl<'r> Classifier<'r, StdRng> {
    /// Seeded when `seed` is given, entropy-seeded otherwise.
    pub fn new(registry: &'r Registry, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(registry, rng)
    }
}

impl<'r, R: Rng> Classifier<'r, R> {
    pub fn with_rng(registry: &'r Registry, rng: R) -> Self {
        Self { registry, rng, max_rounds: MAX_ROUNDS }
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Tallies accumulate across rounds; after each round the first recognizer
    /// (in registry order) whose acceptance rule holds wins.
    pub fn classify<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<&'r Recognizer, ClassifyError> {
        if lines.is_empty() {
            return Err(ClassifyError::Empty);
        }
        let mut tallies = vec![0usize; self.registry.len()];

        for round in 1..=self.max_rounds {
            for _ in 0..SAMPLE_SIZE {
                let index = self.rng.gen_range(0..lines.len());
                let line = lines[index].as_ref();
                debug!("Sample line {:4}/{:4} | {}", index + 1, lines.len(), line);
                if let Some(hit) = self.registry.iter().position(|r| r.matches(line)) {
                    tallies[hit] += 1;
                }
            }

            for (r, tally) in self.registry.iter().zip(&tallies) {
                debug!(round, "tally[{}] = {}", r.name(), tally);
            }

            if let Some(chosen) = self.select(&tallies) {
                return self
                    .registry
                    .at(chosen)
                    .ok_or(ClassifyError::NoConvergence { rounds: round });
            }
        }

        Err(ClassifyError::NoConvergence { rounds: self.max_rounds })
    }

    /// Index of the first recognizer whose acceptance rule holds for its tally.
    pub fn select(&self, tallies: &[usize]) -> Option<usize> {
        self.registry
            .iter()
            .zip(tallies)
            .position(|(r, &tally)| r.acceptance().accepts(tally, TALLY_THRESHOLD, SAMPLE_SIZE))
    }
}
