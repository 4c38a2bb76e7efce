use std::time::Duration;

use crate::config::PollingConfig;

/// Poll intervals: exponential from `initial`, capped at `max`. Never ends.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl PollSchedule {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial.min(max),
            max,
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.initial_interval, config.max_interval, config.multiplier)
    }
}

impl Iterator for PollSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let scaled = current.as_secs_f64() * self.multiplier;
        self.next = if scaled >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(scaled)
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_grow_then_cap() {
        let schedule = PollSchedule::new(Duration::from_secs(2), Duration::from_secs(30), 2.0);
        let intervals: Vec<u64> = schedule.take(7).map(|d| d.as_secs()).collect();
        assert_eq!(intervals, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_intervals_non_decreasing_for_odd_inputs() {
        for (initial, max, multiplier) in [(5, 2, 3.0), (1, 10, 0.5), (1, 10, f64::NAN), (3, 3, 1.0)] {
            let intervals: Vec<Duration> =
                PollSchedule::new(Duration::from_secs(initial), Duration::from_secs(max), multiplier)
                    .take(20)
                    .collect();
            assert!(intervals.windows(2).all(|w| w[0] <= w[1]));
            assert!(intervals.iter().all(|d| *d <= Duration::from_secs(max)));
        }
    }
}
