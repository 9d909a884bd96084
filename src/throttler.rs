//! # Adaptive Throttler Module
//!
//! Client-side congestion signal. The throttler watches how many requests were
//! attempted and how many succeeded over a sliding window. When attempts outrun
//! successes by more than the configured overload ratio, it starts answering
//! "delay this request" with growing probability.
//!
//! The throttler only produces the signal. Sleeping is the dispatcher's job.
//!
//! ## Key Components
//!
//! - `Throttler`: the interface the dispatcher consumes
//! - `AdaptiveThrottler`: probabilistic implementation over two moving sums
//! - `MovingSum`: bucketed sliding-window counter

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

mod moving_sum;

pub use moving_sum::MovingSum;

/// Requests added to the denominator so a single failure never yields certainty
const MIN_REQUESTS: f64 = 1.0;

/// Overload signal consumed by the request dispatcher
pub trait Throttler: Send {
    /// Whether a request starting at `now_ms` should be delayed.
    fn should_throttle(&mut self, now_ms: u64) -> bool;

    /// Register a request that was started at `now_ms` and succeeded.
    fn record_success(&mut self, now_ms: u64);
}

impl<T: Throttler + ?Sized> Throttler for Box<T> {
    fn should_throttle(&mut self, now_ms: u64) -> bool {
        (**self).should_throttle(now_ms)
    }

    fn record_success(&mut self, now_ms: u64) {
        (**self).record_success(now_ms)
    }
}

/// Sliding window parameters for [`AdaptiveThrottler`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleOptions {
    /// Length of the observation window in milliseconds
    pub window_ms: u64,

    /// Width of a single bucket in milliseconds
    pub bucket_ms: u64,

    /// How many attempts per success are tolerated before throttling starts
    pub overload_ratio: f64,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            window_ms: 1,
            bucket_ms: 1,
            overload_ratio: 2.0,
        }
    }
}

/// Throttler that delays requests with a probability derived from recent history
#[derive(Debug)]
pub struct AdaptiveThrottler {
    all_requests: MovingSum,
    successful_requests: MovingSum,
    overload_ratio: f64,
    rng: StdRng,
}

impl AdaptiveThrottler {
    pub fn new(options: &ThrottleOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    /// Create a throttler with a deterministic random source.
    pub fn with_seed(options: &ThrottleOptions, seed: u64) -> Self {
        Self::with_rng(options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(options: &ThrottleOptions, rng: StdRng) -> Self {
        Self {
            all_requests: MovingSum::new(options.window_ms, options.bucket_ms),
            successful_requests: MovingSum::new(options.window_ms, options.bucket_ms),
            overload_ratio: options.overload_ratio,
            rng,
        }
    }

    /// Probability that a request starting at `now_ms` gets delayed.
    pub fn throttling_probability(&mut self, now_ms: u64) -> f64 {
        if !self.all_requests.has_data(now_ms) {
            return 0.0;
        }
        let all = self.all_requests.sum(now_ms) as f64;
        let successful = self.successful_requests.sum(now_ms) as f64;
        ((all - self.overload_ratio * successful) / (all + MIN_REQUESTS)).max(0.0)
    }
}

impl Throttler for AdaptiveThrottler {
    fn should_throttle(&mut self, now_ms: u64) -> bool {
        let probability = self.throttling_probability(now_ms);
        self.all_requests.add(now_ms, 1);
        self.rng.gen_range(0.0..1.0) < probability
    }

    fn record_success(&mut self, now_ms: u64) {
        self.successful_requests.add(now_ms, 1);
    }
}
