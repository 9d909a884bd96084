/// A sum over a sliding time window, kept in fixed-width buckets.
///
/// Time is expressed in milliseconds. The window covers
/// `ceil(window_ms / bucket_ms)` buckets; observations older than that fall off
/// as the ring advances.
#[derive(Debug, Clone)]
pub struct MovingSum {
    bucket_ms: u64,
    buckets: Vec<Bucket>,
    current_index: usize,
    current_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: i64,
    count: u64,
}

impl MovingSum {
    /// Create a moving sum. `bucket_ms` must be non-zero and no larger than `window_ms`.
    pub fn new(window_ms: u64, bucket_ms: u64) -> Self {
        assert!(
            bucket_ms > 0 && window_ms >= bucket_ms,
            "moving sum needs 0 < bucket_ms <= window_ms"
        );
        let num_buckets = window_ms.div_ceil(bucket_ms) as usize;
        let mut sum = Self {
            bucket_ms,
            buckets: vec![Bucket::default(); num_buckets],
            current_index: 0,
            current_ms: 0,
        };
        sum.reset(0);
        sum
    }

    fn reset(&mut self, now_ms: u64) {
        self.current_index = 0;
        self.current_ms = (now_ms / self.bucket_ms) * self.bucket_ms;
        self.buckets.fill(Bucket::default());
    }

    fn flush(&mut self, now_ms: u64) {
        let span = self.bucket_ms * self.buckets.len() as u64;
        if now_ms >= self.current_ms + span {
            self.reset(now_ms);
            return;
        }
        while now_ms > self.current_ms + self.bucket_ms {
            self.current_ms += self.bucket_ms;
            self.current_index = (self.current_index + 1) % self.buckets.len();
            self.buckets[self.current_index] = Bucket::default();
        }
    }

    /// Record `inc` at `now_ms`.
    pub fn add(&mut self, now_ms: u64, inc: i64) {
        self.flush(now_ms);
        let bucket = &mut self.buckets[self.current_index];
        bucket.sum += inc;
        bucket.count += 1;
    }

    /// Sum of all increments still inside the window.
    pub fn sum(&mut self, now_ms: u64) -> i64 {
        self.flush(now_ms);
        self.buckets.iter().map(|b| b.sum).sum()
    }

    /// Number of `add` calls still inside the window.
    pub fn count(&mut self, now_ms: u64) -> u64 {
        self.flush(now_ms);
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn has_data(&mut self, now_ms: u64) -> bool {
        self.count(now_ms) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_within_window() {
        let mut sum = MovingSum::new(10, 1);
        sum.add(0, 1);
        sum.add(5, 2);
        assert_eq!(sum.sum(9), 3);
        assert_eq!(sum.count(9), 2);
    }

    #[test]
    fn test_old_buckets_expire() {
        let mut sum = MovingSum::new(10, 1);
        sum.add(0, 1);
        sum.add(5, 1);
        assert_eq!(sum.sum(13), 1);
        assert!(sum.has_data(13));
    }

    #[test]
    fn test_jump_past_window_resets() {
        let mut sum = MovingSum::new(100, 10);
        sum.add(3, 4);
        assert_eq!(sum.sum(50), 4);
        assert_eq!(sum.sum(500), 0);
        assert!(!sum.has_data(500));
    }

    #[test]
    fn test_partial_bucket_rounds_up() {
        let sum = MovingSum::new(25, 10);
        assert_eq!(sum.buckets.len(), 3);
    }

    #[test]
    #[should_panic]
    fn test_rejects_zero_bucket() {
        MovingSum::new(10, 0);
    }
}
