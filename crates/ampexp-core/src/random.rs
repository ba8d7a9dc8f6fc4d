// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Source of uniform draws in `[0, 1)`, one per session.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

/// Draws from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_f64(&mut self) -> f64 {
        // 53 high bits give every representable step in [0, 1).
        (OsRng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// Reproducible stream for simulations and the CLI.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: ChaCha20Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[derive(Debug, Default)]
struct Script {
    draws: VecDeque<f64>,
    fallback: f64,
    calls: usize,
}

/// Replays predetermined draws in order and counts how many were taken.
///
/// Clones share the same script, so a test can keep a handle after moving
/// one into a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                draws: draws.into_iter().collect(),
                fallback: 0.0,
                calls: 0,
            })),
        }
    }

    /// Value returned once the script runs out.
    pub fn with_fallback(self, fallback: f64) -> Self {
        self.script.lock().fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.script.lock().calls
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().draws.len()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        let mut script = self.script.lock();
        script.calls += 1;
        let fallback = script.fallback;
        script.draws.pop_front().unwrap_or(fallback)
    }
}
