//! Work plan construction: turns a validated configuration shape into a
//! fixed list of work-unit descriptors.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};

/// Default ceiling on the number of chunks in one plan.
pub const DEFAULT_MAX_CHUNKS: usize = 10_000;

/// One planned shard of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Position in the plan, unique within it.
    pub index: usize,
    /// Seed passed to the sampling job, kept as a string end to end.
    pub seed: String,
    /// Number of samples this unit draws.
    pub iterations: u64,
    /// Where the unit writes its partial result.
    pub result_locator: String,
}

/// Half-open numeric range randomized seeds are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRange {
    pub start: u64,
    pub end: u64,
}

impl SeedRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of distinct seeds the range can produce.
    pub fn capacity(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl Default for SeedRange {
    fn default() -> Self {
        Self::new(1, 1_000_000)
    }
}

/// Where the per-unit seeds come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// Seeds provided by the configuration, one per chunk.
    Explicit(Vec<String>),
    /// Distinct seeds drawn without replacement from a range.
    Randomized(SeedRange),
}

impl SeedSource {
    pub fn explicit<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self::Explicit(seeds.into_iter().map(|s| s.to_string()).collect())
    }

    pub fn randomized() -> Self {
        Self::Randomized(SeedRange::default())
    }
}

/// The ordered work units of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPlan {
    pub run_name: String,
    pub units: Vec<WorkUnit>,
}

impl WorkPlan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, index: usize) -> Option<&WorkUnit> {
        self.units.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkUnit> {
        self.units.iter()
    }

    /// Sum of iterations across every unit.
    pub fn total_iterations(&self) -> u64 {
        self.units.iter().map(|u| u.iterations).sum()
    }
}

/// Deterministic locator for a unit's partial result.
pub fn result_locator(run_name: &str, index: usize) -> String {
    format!("{run_name}/{index}")
}

/// Builds work plans for a named run.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    run_name: String,
    max_chunks: usize,
}

impl PlanBuilder {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }

    /// Set the ceiling on chunks per plan.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Build a plan, drawing randomized seeds from the thread RNG.
    pub fn build(
        &self,
        chunk_count: usize,
        iterations_per_chunk: u64,
        seed_source: SeedSource,
    ) -> FleetResult<WorkPlan> {
        self.build_with_rng(
            chunk_count,
            iterations_per_chunk,
            seed_source,
            &mut rand::thread_rng(),
        )
    }

    /// Build a plan with an injected RNG for randomized seeds.
    pub fn build_with_rng<R: Rng + ?Sized>(
        &self,
        chunk_count: usize,
        iterations_per_chunk: u64,
        seed_source: SeedSource,
        rng: &mut R,
    ) -> FleetResult<WorkPlan> {
        self.validate(chunk_count, iterations_per_chunk)?;

        let seeds = match seed_source {
            SeedSource::Explicit(seeds) => {
                if seeds.len() != chunk_count {
                    return Err(FleetError::InvalidPlan(format!(
                        "expected {chunk_count} seeds, got {}",
                        seeds.len()
                    )));
                }
                seeds
            }
            SeedSource::Randomized(range) => draw_seeds(range, chunk_count, rng)?,
        };

        let units = seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| WorkUnit {
                index,
                seed,
                iterations: iterations_per_chunk,
                result_locator: result_locator(&self.run_name, index),
            })
            .collect();

        Ok(WorkPlan {
            run_name: self.run_name.clone(),
            units,
        })
    }

    fn validate(&self, chunk_count: usize, iterations_per_chunk: u64) -> FleetResult<()> {
        if self.run_name.trim().is_empty() {
            return Err(FleetError::InvalidPlan("run name must not be empty".into()));
        }
        if self.run_name.contains('/') {
            return Err(FleetError::InvalidPlan(format!(
                "run name must not contain '/': {}",
                self.run_name
            )));
        }
        if chunk_count == 0 {
            return Err(FleetError::InvalidPlan("chunk count must be positive".into()));
        }
        if chunk_count > self.max_chunks {
            return Err(FleetError::InvalidPlan(format!(
                "chunk count {chunk_count} exceeds the limit of {}",
                self.max_chunks
            )));
        }
        if iterations_per_chunk == 0 {
            return Err(FleetError::InvalidPlan(
                "iterations per chunk must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn draw_seeds<R: Rng + ?Sized>(
    range: SeedRange,
    count: usize,
    rng: &mut R,
) -> FleetResult<Vec<String>> {
    let capacity = range.capacity();
    if count as u64 > capacity {
        return Err(FleetError::InvalidPlan(format!(
            "cannot draw {count} distinct seeds from [{}, {})",
            range.start, range.end
        )));
    }

    // Sparse draws avoid materialising large ranges.
    let mut seen = HashSet::with_capacity(count);
    let mut seeds = Vec::with_capacity(count);
    if (count as u64).saturating_mul(2) <= capacity {
        while seeds.len() < count {
            let seed = rng.gen_range(range.start..range.end);
            if seen.insert(seed) {
                seeds.push(seed.to_string());
            }
        }
    } else {
        let width = usize::try_from(capacity).map_err(|_| {
            FleetError::InvalidPlan(format!("seed range [{}, {}) is too wide", range.start, range.end))
        })?;
        for offset in rand::seq::index::sample(rng, width, count) {
            seeds.push((range.start + offset as u64).to_string());
        }
    }
    Ok(seeds)
}
