//! Reproducible per-worker random streams.
//!
//! One master engine (owned by the model, reset by `set_seed`) seeds one
//! independent `StdRng` per worker. Seeding consumes the master stream
//! sequentially in worker-index order, so a fixed master seed and worker
//! count always reproduce the same pool, and changing the worker count
//! changes every derived seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed-size pool of worker-local random engines for one sampler run.
pub struct StreamPool {
    engines: Vec<StdRng>,
}

impl StreamPool {
    /// Spawn one engine per worker from the master engine.
    pub fn spawn(master: &mut StdRng, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let engines = (0..worker_count)
            .map(|index| {
                let u: f64 = master.random();
                StdRng::seed_from_u64(derive_stream_seed(u, index, worker_count))
            })
            .collect();
        StreamPool { engines }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Worker 0's engine, used for the single-threaded draw phases.
    pub(crate) fn primary(&mut self) -> &mut StdRng {
        &mut self.engines[0]
    }

    pub(crate) fn engines_mut(&mut self) -> &mut [StdRng] {
        &mut self.engines
    }
}

/// Derive the seed for one worker's engine.
///
/// Pure function of the master-stream draw, the worker index, and the
/// worker count; must not change, or fixed-seed runs lose reproducibility.
pub fn derive_stream_seed(u: f64, worker_index: usize, worker_count: usize) -> u64 {
    ((u + worker_index as f64 + worker_count as f64) * 1000.0) as u64
}
