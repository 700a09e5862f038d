//! Retry/backoff policy.

use std::time::Duration;

/// Maximum number of attempts a job may consume before it is finalized.
pub const MAX_RETRIES: u32 = 3;

/// Default backoff schedule between attempts.
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// What to do with a job that just failed an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redeliver after the backoff delay for this retry.
    Requeue { delay: Duration },
    /// Retries exhausted: finalize (refund + notify happen in the
    /// lifecycle, not here).
    Finalize,
}

/// Encodes the backoff policy: retry *k* (1-indexed) is redelivered after
/// `delays[k-1]`, clamped to the last entry when the schedule is shorter
/// than the retry bound.
///
/// The scheduler holds no balance or status logic; it only answers
/// "requeue after how long, or stop".
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    max_retries: u32,
    delays: Vec<Duration>,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delays: DEFAULT_BACKOFF.to_vec(),
        }
    }
}

impl RetryScheduler {
    pub fn new(max_retries: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_retries,
            delays,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff delay before retry `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.delays.is_empty() {
            return Duration::ZERO;
        }
        let index = (retry.max(1) as usize - 1).min(self.delays.len() - 1);
        self.delays[index]
    }

    /// Decide the fate of a job whose retry count just reached
    /// `retry_count`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            RetryDecision::Finalize
        } else {
            RetryDecision::Requeue {
                delay: self.delay_for(retry_count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_follow_the_schedule_and_clamp() {
        let scheduler = RetryScheduler::default();
        assert_eq!(scheduler.delay_for(1), Duration::from_secs(10));
        assert_eq!(scheduler.delay_for(2), Duration::from_secs(30));
        assert_eq!(scheduler.delay_for(3), Duration::from_secs(60));
        // Past the end of the schedule: clamp to the last entry.
        assert_eq!(scheduler.delay_for(7), Duration::from_secs(60));
    }

    #[test]
    fn decide_finalizes_at_the_bound() {
        let scheduler = RetryScheduler::default();
        assert_eq!(
            scheduler.decide(1),
            RetryDecision::Requeue {
                delay: Duration::from_secs(10)
            }
        );
        assert_eq!(
            scheduler.decide(2),
            RetryDecision::Requeue {
                delay: Duration::from_secs(30)
            }
        );
        assert_eq!(scheduler.decide(3), RetryDecision::Finalize);
        assert_eq!(scheduler.decide(4), RetryDecision::Finalize);
    }

    #[test]
    fn short_schedule_clamps_to_last_entry() {
        let scheduler = RetryScheduler::new(5, vec![Duration::from_secs(5)]);
        assert_eq!(
            scheduler.decide(4),
            RetryDecision::Requeue {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn empty_schedule_means_immediate_redelivery() {
        let scheduler = RetryScheduler::new(2, Vec::new());
        assert_eq!(
            scheduler.decide(1),
            RetryDecision::Requeue {
                delay: Duration::ZERO
            }
        );
    }
}
