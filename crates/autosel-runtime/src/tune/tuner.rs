use core::time::Duration;
use std::sync::{Arc, Mutex, OnceLock};

use hashbrown::HashMap;

use autosel_common::benchmark::{Benchmark, BenchmarkComputations, TimingMethod};

use super::{AutotuneError, AutotuneKey, Choice, TuneBenchmark, TuneCache, TuneCacheResult};
use crate::config::autotune::AutotuneLogLevel;
use crate::config::{GlobalConfig, Logger};
use crate::counters;

/// Verification callback applied to a choice's output before timing it.
///
/// Returning an error disqualifies the choice without aborting the pass.
pub type VerifyFn<'a, Out> = &'a dyn Fn(&Out) -> Result<(), AutotuneError>;

/// Executes autotune benchmarking and caching.
///
/// At most one benchmarking pass runs per distinct key: concurrent callers
/// for the same key block on a shared cell and reuse its outcome.
pub struct Tuner<K: AutotuneKey> {
    cache: Mutex<TuneCache<K>>,
    in_flight: Mutex<HashMap<K, Arc<OnceLock<Result<usize, AutotuneError>>>>>,
    logger: Mutex<Logger>,
    num_samples: usize,
}

impl<K: AutotuneKey> core::fmt::Debug for Tuner<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tuner")
            .field("num_samples", &self.num_samples)
            .finish()
    }
}

impl<K: AutotuneKey> Tuner<K> {
    /// Returns a tuner with its cache initialized from the persistent cache
    /// when that feature is enabled.
    pub fn new(name: &str, device_id: &str) -> Self {
        let config = GlobalConfig::get();
        Self {
            cache: Mutex::new(TuneCache::new(name, device_id)),
            in_flight: Mutex::new(HashMap::new()),
            logger: Mutex::new(Logger::new()),
            num_samples: config.autotune.level.num_samples().max(1),
        }
    }

    /// Winner of a previous pass for the key, if any.
    pub fn fastest(&self, key: &K) -> TuneCacheResult {
        self.cache.lock().unwrap().fastest(key)
    }

    /// Winner index for the key, running one benchmark/verify pass over the
    /// choices when no winner is known yet.
    pub fn execute<In, Out>(
        &self,
        name: &str,
        key: K,
        choices: &[Arc<dyn Choice<In, Out>>],
        inputs: &In,
        verify: Option<VerifyFn<'_, Out>>,
    ) -> Result<usize, AutotuneError>
    where
        In: Clone,
    {
        {
            let mut cache = self.cache.lock().unwrap();
            match cache.fastest(&key) {
                TuneCacheResult::Hit { fastest_index } => return Ok(fastest_index),
                TuneCacheResult::Miss => {}
                #[cfg(feature = "autotune-cache")]
                TuneCacheResult::Unchecked => {
                    let checksum = compute_checksum(choices);
                    if let TuneCacheResult::Hit { fastest_index } =
                        cache.fastest_with_checksum(&key, &checksum)
                    {
                        return Ok(fastest_index);
                    }
                }
            }
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.entry(key.clone()).or_default().clone()
        };

        let result = cell
            .get_or_init(|| self.autotuning(name, &key, choices, inputs, verify))
            .clone();

        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.remove(&key);

        result
    }

    /// One benchmarking pass: verify each choice against the reference, time
    /// the survivors, store and return the winner.
    fn autotuning<In, Out>(
        &self,
        name: &str,
        key: &K,
        choices: &[Arc<dyn Choice<In, Out>>],
        inputs: &In,
        verify: Option<VerifyFn<'_, Out>>,
    ) -> Result<usize, AutotuneError>
    where
        In: Clone,
    {
        counters::increment(counters::SELECT_ALGORITHM_AUTOTUNE);

        let medians: Vec<Option<Duration>> = choices
            .iter()
            .map(|choice| self.run_benchmark(choice.as_ref(), inputs, verify))
            .collect();

        let fastest = find_fastest(&medians).ok_or_else(|| {
            AutotuneError::NoValidChoice(format!(
                "all {} choices for '{name}' were disqualified",
                choices.len()
            ))
        })?;

        let fastest_name = choices[fastest].name();
        {
            let mut logger = self.logger.lock().unwrap();
            let level = logger.config.autotune.logger.level;
            match level {
                AutotuneLogLevel::Disabled => {}
                AutotuneLogLevel::Minimal => {
                    logger.log_autotune(format_args!("Fastest result {fastest_name}-{key}"));
                }
                AutotuneLogLevel::Full => {
                    for (index, median) in medians.iter().enumerate() {
                        let name = choices[index].name();
                        match median {
                            Some(median) => {
                                logger.log_autotune(format_args!("  {name}: {median:?}"))
                            }
                            None => logger.log_autotune(format_args!("  {name}: disqualified")),
                        }
                    }
                    logger.log_autotune(format_args!("Fastest result {fastest_name}-{key}"));
                }
            }
        }

        let mut cache = self.cache.lock().unwrap();
        cache.cache_insert(key.clone(), fastest);
        #[cfg(feature = "autotune-cache")]
        {
            let checksum = compute_checksum(choices);
            cache.persistent_cache_insert(key.clone(), checksum, fastest);
            if let Err(err) = cache.save() {
                log::warn!("Unable to save autotune cache ({err}).");
            }
        }

        Ok(fastest)
    }

    fn run_benchmark<In, Out>(
        &self,
        choice: &dyn Choice<In, Out>,
        inputs: &In,
        verify: Option<VerifyFn<'_, Out>>,
    ) -> Option<Duration>
    where
        In: Clone,
    {
        // Verification run, before any timing.
        let output = match choice.call(inputs.clone()) {
            Ok(output) => output,
            Err(err) => {
                log::warn!("Choice '{}' disqualified: {err}", choice.name());
                return None;
            }
        };

        if let Some(verify) = verify {
            if let Err(err) = verify(&output) {
                log::warn!("Choice '{}' disqualified: {err}", choice.name());
                return None;
            }
        }

        let durations =
            TuneBenchmark::new(choice, inputs.clone(), self.num_samples).run(TimingMethod::System);

        Some(BenchmarkComputations::new(&durations).median)
    }
}

/// Index of the smallest median; the earliest choice wins exact ties.
fn find_fastest(medians: &[Option<Duration>]) -> Option<usize> {
    let mut smallest_duration = Duration::MAX;
    let mut fastest = None;

    for (index, median) in medians.iter().enumerate() {
        if let Some(median) = median {
            if *median < smallest_duration {
                smallest_duration = *median;
                fastest = Some(index);
            }
        }
    }

    fastest
}

/// Checksum over the choice names, invalidating stale persisted winners.
#[cfg(feature = "autotune-cache")]
pub(crate) fn compute_checksum<In, Out>(choices: &[Arc<dyn Choice<In, Out>>]) -> String {
    let mut concat = String::new();
    for choice in choices {
        concat += choice.name();
    }
    format!("{:x}", md5::compute(concat))
}
