//! Expansion of stores into the month's visit instances.
//!
//! Whole frequencies expand to `floor(frequency)` instances. Fractional
//! frequencies below one are realized by a seeded draw so the same store,
//! class and month epoch always produce the same count.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::PlannerConfig;
use crate::model::{Store, StoreId, VisitInstance};

/// Deterministic per-store sampler.
///
/// Each draw seeds a fresh generator from `(store id, priority class,
/// epoch)`, so results do not depend on store order.
#[derive(Debug, Clone, Copy)]
pub struct SeededSampler {
    epoch: i64,
}

impl SeededSampler {
    pub fn new(epoch: i64) -> Self {
        Self { epoch }
    }

    /// Uniform value in `[0, 1)` for a store in this epoch.
    pub fn draw(&self, store_id: &StoreId, priority_class: u8) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed_for(store_id, priority_class, self.epoch));
        rng.gen_range(0.0..1.0)
    }
}

/// FNV-1a over the seed components, finished with a splitmix64 avalanche.
fn seed_for(store_id: &StoreId, priority_class: u8, epoch: i64) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let bytes = store_id
        .as_str()
        .bytes()
        .chain(std::iter::once(0xff))
        .chain(std::iter::once(priority_class))
        .chain(epoch.to_le_bytes());
    for byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    let mut z = hash.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Output of one expansion run.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub instances: Vec<VisitInstance>,
    /// Instances allotted per store (only stores with at least one).
    pub allotted: BTreeMap<StoreId, u32>,
}

pub struct VisitExpander<'a> {
    config: &'a PlannerConfig,
    sampler: SeededSampler,
}

impl<'a> VisitExpander<'a> {
    pub fn new(config: &'a PlannerConfig, epoch: i64) -> Self {
        Self {
            config,
            sampler: SeededSampler::new(epoch),
        }
    }

    /// Monthly frequency for a store after class overrides.
    pub fn effective_frequency(&self, store: &Store) -> f64 {
        self.config
            .priority_frequencies
            .get(&store.priority_class)
            .copied()
            .unwrap_or(store.base_frequency)
    }

    /// Number of instances a store receives this month.
    pub fn occurrences_for(&self, store: &Store) -> u32 {
        let frequency = self.effective_frequency(store);
        if frequency <= 0.0 || frequency < self.config.min_frequency_threshold {
            return 0;
        }
        if frequency >= 1.0 {
            return frequency.floor() as u32;
        }
        let value = self.sampler.draw(&store.id, store.priority_class);
        u32::from(value < frequency.fract())
    }

    pub fn expand(&self, stores: &[Store]) -> Expansion {
        let mut expansion = Expansion::default();

        for store in stores {
            let count = self.occurrences_for(store);
            if count == 0 {
                continue;
            }
            expansion.allotted.insert(store.id.clone(), count);
            for sequence in 1..=count {
                expansion.instances.push(self.instance(store, sequence, count, false));
            }
        }

        debug!(
            stores = stores.len(),
            instances = expansion.instances.len(),
            "expanded stores into visit instances"
        );
        expansion
    }

    /// One optional candidate per filler store.
    pub fn expand_fillers(&self, fillers: &[Store]) -> Vec<VisitInstance> {
        fillers
            .iter()
            .map(|store| self.instance(store, 1, 1, true))
            .collect()
    }

    fn instance(&self, store: &Store, sequence: u32, occurrences: u32, filler: bool) -> VisitInstance {
        VisitInstance {
            store_id: store.id.clone(),
            sequence,
            occurrences,
            multi_visit: occurrences > 1,
            priority_class: store.priority_class,
            location: store.location,
            duration_minutes: store
                .visit_duration_minutes
                .unwrap_or(self.config.default_visit_minutes),
            filler,
        }
    }
}
