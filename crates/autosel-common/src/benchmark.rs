use core::time::Duration;
use std::time::Instant;

/// How the durations of a benchmark were measured.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TimingMethod {
    /// Wall-clock timing on the host, dispatch overhead included.
    #[default]
    System,
    /// Timing reported by the executing device.
    Device,
}

/// Results of a benchmark run, with the durations of all samples.
#[derive(Debug, Default, Clone)]
pub struct BenchmarkDurations {
    /// How the durations were measured.
    pub timing_method: TimingMethod,
    /// All sampled durations.
    pub durations: Vec<Duration>,
}

impl BenchmarkDurations {
    /// Create system-timed durations from raw samples.
    pub fn new(durations: Vec<Duration>) -> Self {
        Self {
            timing_method: TimingMethod::System,
            durations,
        }
    }
}

/// Computed values from benchmark durations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BenchmarkComputations {
    /// Mean of all samples.
    pub mean: Duration,
    /// Median of all samples.
    pub median: Duration,
    /// Variance of all samples.
    pub variance: Duration,
    /// Minimum sample.
    pub min: Duration,
    /// Maximum sample.
    pub max: Duration,
}

impl BenchmarkComputations {
    /// Compute statistics from the given durations.
    pub fn new(durations: &BenchmarkDurations) -> Self {
        let mean = durations.mean_duration();
        let (min, max, median) = durations.min_max_median_durations();

        Self {
            mean,
            median,
            min,
            max,
            variance: durations.variance_duration(mean),
        }
    }
}

impl BenchmarkDurations {
    fn mean_duration(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        self.durations.iter().sum::<Duration>() / self.durations.len() as u32
    }

    fn min_max_median_durations(&self) -> (Duration, Duration, Duration) {
        let mut sorted = self.durations.clone();
        sorted.sort();
        if sorted.is_empty() {
            return (Duration::ZERO, Duration::ZERO, Duration::ZERO);
        }
        let min = *sorted.first().unwrap();
        let max = *sorted.last().unwrap();
        let median = sorted[sorted.len() / 2];
        (min, max, median)
    }

    fn variance_duration(&self, mean: Duration) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        self.durations
            .iter()
            .map(|duration| {
                let tmp = duration.as_secs_f64() - mean.as_secs_f64();
                Duration::from_secs_f64(tmp * tmp)
            })
            .sum::<Duration>()
            / self.durations.len() as u32
    }
}

/// A measurable workload.
///
/// `run` executes the workload once to warm up, then samples it
/// [`num_samples`](Benchmark::num_samples) times.
pub trait Benchmark {
    /// The input argument passed to every execution.
    type Input: Clone;
    /// The produced output, discarded during timing.
    type Output;

    /// Prepare the input outside of the timed region.
    fn prepare(&self) -> Self::Input;

    /// Execute the workload once.
    fn execute(&self, input: Self::Input) -> Self::Output;

    /// Number of timed samples.
    fn num_samples(&self) -> usize {
        10
    }

    /// Name of the workload, for logs.
    fn name(&self) -> String;

    /// Wait for all outstanding work to complete.
    fn sync(&self) {}

    /// Run the benchmark and collect all sample durations.
    fn run(&self, timing_method: TimingMethod) -> BenchmarkDurations {
        let input = self.prepare();

        // Warmup pass, not recorded.
        self.execute(input.clone());
        self.sync();

        let mut durations = Vec::with_capacity(self.num_samples());
        for _ in 0..self.num_samples() {
            let start = Instant::now();
            self.execute(input.clone());
            self.sync();
            durations.push(start.elapsed());
        }

        BenchmarkDurations {
            timing_method,
            durations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_number_of_samples() {
        let durations = BenchmarkDurations::new(vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(30),
            Duration::from_millis(40),
        ]);
        let computed = BenchmarkComputations::new(&durations);
        assert_eq!(computed.median, Duration::from_millis(30));
        assert_eq!(computed.min, Duration::from_millis(10));
        assert_eq!(computed.max, Duration::from_millis(40));
        assert_eq!(computed.mean, Duration::from_millis(25));
    }

    #[test]
    fn test_median_unsorted_input() {
        let durations = BenchmarkDurations::new(vec![
            Duration::from_millis(50),
            Duration::from_millis(10),
            Duration::from_millis(30),
        ]);
        let computed = BenchmarkComputations::new(&durations);
        assert_eq!(computed.median, Duration::from_millis(30));
    }
}
