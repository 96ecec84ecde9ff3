//! Error backoff handling

use tessera_clock::DurationSecs;

/// Utility trait for extending types with a throttle
pub trait WithBackoff {
    /// The output of providing backoff
    type Output;

    /// Applies backoff to the current value
    fn with_backoff(self, throttle: &mut Throttle) -> Self::Output;
}

impl<T, E> WithBackoff for Result<T, E> {
    type Output = Result<T, (E, DurationSecs)>;
    fn with_backoff(self, throttle: &mut Throttle) -> Self::Output {
        match self {
            Ok(ok) => {
                throttle.success();
                Ok(ok)
            }
            Err(err) => Err((err, throttle.error())),
        }
    }
}

/// Exponential backoff state for retrying a failed reload
///
/// The delay starts at `min`, doubles after every consecutive failure, never
/// exceeds `max`, and drops back to `min` after a success. No jitter is applied.
#[derive(Debug)]
pub struct Throttle {
    min: DurationSecs,
    max: DurationSecs,
    current: DurationSecs,
}

impl Throttle {
    /// Constructs a throttle bounded by `min` and `max`
    pub fn new(min: DurationSecs, max: DurationSecs) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    /// The delay that the next failure will be scheduled with
    #[inline]
    pub fn current(&self) -> DurationSecs {
        self.current
    }

    /// Reports a success
    ///
    /// This resets the internal delay state.
    pub fn success(&mut self) {
        self.current = self.min;
    }

    /// Reports a failure and returns the delay to wait before retrying
    ///
    /// The delay for the following failure is doubled, capped at the maximum.
    pub fn error(&mut self) -> DurationSecs {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut throttle = Throttle::new(DurationSecs(1), DurationSecs(10));

        let delays: Vec<u64> = (0..6).map(|_| throttle.error().0).collect();

        assert_eq!(delays, [1, 2, 4, 8, 10, 10]);
        assert_eq!(throttle.current(), DurationSecs(10));
    }

    #[test]
    fn after_n_failures_current_is_min_times_two_to_the_n() {
        let min = 3;
        let max = 600;
        let mut throttle = Throttle::new(DurationSecs(min), DurationSecs(max));

        for n in 1..=10u32 {
            throttle.error();
            let expected = (min * 2u64.pow(n)).min(max);
            assert_eq!(throttle.current(), DurationSecs(expected), "after {} failures", n);
        }
    }

    #[test]
    fn success_resets_to_min() {
        let mut throttle = Throttle::new(DurationSecs(1), DurationSecs(600));
        throttle.error();
        throttle.error();

        let result: Result<(), ()> = Ok(());
        assert!(result.with_backoff(&mut throttle).is_ok());
        assert_eq!(throttle.current(), DurationSecs(1));
    }

    #[test]
    fn failed_result_carries_the_delay() {
        let mut throttle = Throttle::new(DurationSecs(2), DurationSecs(600));

        let first: Result<(), &str> = Err("boom");
        let second: Result<(), &str> = Err("boom");

        assert_eq!(first.with_backoff(&mut throttle), Err(("boom", DurationSecs(2))));
        assert_eq!(second.with_backoff(&mut throttle), Err(("boom", DurationSecs(4))));
    }
}
