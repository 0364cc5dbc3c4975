use std::sync::Arc;

use autosel_common::tolerance::Tolerance;

use super::{AutotuneError, AutotuneKey, Choice, PreprocessingFns, Tuner, VerifyFn};
use crate::config::GlobalConfig;
use crate::config::autotune::AutotuneLevel;

/// Outcome of a selection request.
#[derive(Debug)]
pub enum Selection<Out> {
    /// The winning choice executed and produced this output.
    Executed(Out),
    /// The choice list was empty after preprocessing; the caller should run
    /// its eager path. Not an error.
    NothingToSelect,
}

impl<Out> Selection<Out> {
    /// The produced output, if a choice executed.
    pub fn output(self) -> Option<Out> {
        match self {
            Selection::Executed(output) => Some(output),
            Selection::NothingToSelect => None,
        }
    }
}

/// Selects the winning implementation for an operation site.
///
/// Owns the preprocessing pipeline, the per-key winner cache and the
/// verification tolerances. One selector serves many operation sites; sites
/// are distinguished by their [autotune key](AutotuneKey).
pub struct AlgorithmSelector<K: AutotuneKey, In: Clone, Out> {
    preprocessing: PreprocessingFns<Arc<dyn Choice<In, Out>>>,
    tuner: Tuner<K>,
    tolerance: Tolerance,
    level: AutotuneLevel,
}

impl<K: AutotuneKey, In: Clone, Out> AlgorithmSelector<K, In, Out> {
    /// Create a selector, taking tolerances and tuning level from the global
    /// configuration.
    pub fn new(name: &str) -> Self {
        let config = GlobalConfig::get();
        Self {
            preprocessing: PreprocessingFns::new(),
            tuner: Tuner::new(name, "cpu"),
            tolerance: config.autotune.verify,
            level: config.autotune.level,
        }
    }

    /// Override the verification tolerances.
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the tuning level.
    pub fn with_level(mut self, level: AutotuneLevel) -> Self {
        self.level = level;
        self
    }

    /// Verification tolerances applied to candidate outputs.
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Append a preprocessing function, applied after all previously
    /// registered ones.
    pub fn add_preprocessing_fn(
        &mut self,
        f: impl Fn(Vec<Arc<dyn Choice<In, Out>>>) -> Vec<Arc<dyn Choice<In, Out>>>
        + Send
        + Sync
        + 'static,
    ) {
        self.preprocessing.add(f);
    }

    /// Remove every registered preprocessing function.
    pub fn clear_preprocessing_fns(&mut self) {
        self.preprocessing.clear();
    }

    /// The tuner backing this selector.
    pub fn tuner(&self) -> &Tuner<K> {
        &self.tuner
    }

    /// Select and execute the winning choice for one operation site.
    ///
    /// The choice list is passed through the preprocessing pipeline first.
    /// An empty list selects nothing; a single choice executes directly; with
    /// two or more choices the tuner benchmarks them once per distinct key
    /// and bumps the autotune counter for that pass. `verify` is applied to
    /// every candidate output during the pass; out-of-tolerance candidates
    /// are disqualified.
    pub fn select(
        &self,
        name: &str,
        key: K,
        choices: Vec<Arc<dyn Choice<In, Out>>>,
        inputs: In,
        verify: Option<VerifyFn<'_, Out>>,
    ) -> Result<Selection<Out>, AutotuneError> {
        let choices = self.preprocessing.apply(choices);

        match choices.len() {
            0 => Ok(Selection::NothingToSelect),
            1 => choices[0].call(inputs).map(Selection::Executed),
            _ => {
                if self.level == AutotuneLevel::Minimal {
                    // Benchmarking bypassed: run the default choice.
                    return choices[0].call(inputs).map(Selection::Executed);
                }

                let fastest = self.tuner.execute(name, key, &choices, &inputs, verify)?;
                choices[fastest].call(inputs).map(Selection::Executed)
            }
        }
    }
}
