use autosel_common::benchmark::Benchmark;

use super::{AutotuneError, Choice};

/// A benchmark measuring one selection choice on cloned inputs.
///
/// Every sample runs on its own clone of the inputs, so no choice can observe
/// another's side effects.
#[derive(new)]
pub struct TuneBenchmark<'a, In: Clone, Out> {
    choice: &'a dyn Choice<In, Out>,
    inputs: In,
    num_samples: usize,
}

impl<In: Clone, Out> Benchmark for TuneBenchmark<'_, In, Out> {
    type Input = In;
    type Output = Result<Out, AutotuneError>;

    fn prepare(&self) -> Self::Input {
        self.inputs.clone()
    }

    fn execute(&self, input: Self::Input) -> Self::Output {
        self.choice.call(input)
    }

    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn name(&self) -> String {
        self.choice.name().to_string()
    }
}
