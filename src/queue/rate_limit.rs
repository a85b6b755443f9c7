use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window message rate limiter.
///
/// Keeps the timestamps of accepted messages within the trailing window and
/// prunes them lazily on each check. A rejected attempt is never recorded,
/// so rejections do not extend the window occupancy.
pub struct SlidingWindow {
    max_events: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            timestamps: VecDeque::new(),
        }
    }

    /// Try to admit one event at `now`.
    ///
    /// When `enforce` is false the event is always admitted but still
    /// recorded, so the current rate stays observable while limiting is
    /// disabled.
    pub fn try_admit(&mut self, now: Instant, enforce: bool) -> bool {
        self.prune(now);

        if enforce && self.timestamps.len() >= self.max_events {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Number of accepted events currently inside the window.
    pub fn current_count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Throttle for repeated warning logs, independent of admission decisions.
///
/// A message can be dropped many times while only one warning per throttle
/// interval is emitted.
pub struct LogThrottle {
    min_interval: Duration,
    last_logged: Option<Instant>,
}

impl LogThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_logged: None,
        }
    }

    /// Returns true when enough time has passed since the last emitted log.
    pub fn should_log(&mut self, now: Instant) -> bool {
        match self.last_logged {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_logged = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let mut window = SlidingWindow::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(window.try_admit(now, true));
        assert!(window.try_admit(now, true));
        assert!(window.try_admit(now, true));
        assert!(!window.try_admit(now, true));
        assert_eq!(window.current_count(now), 3);
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let mut window = SlidingWindow::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(window.try_admit(now, true));
        assert!(window.try_admit(now, true));

        // Hammer the full window; occupancy must stay at the limit.
        for _ in 0..10 {
            assert!(!window.try_admit(now, true));
        }
        assert_eq!(window.current_count(now), 2);
    }

    #[test]
    fn test_window_slides() {
        let mut window = SlidingWindow::new(2, Duration::from_millis(100));
        let start = Instant::now();

        assert!(window.try_admit(start, true));
        assert!(window.try_admit(start, true));
        assert!(!window.try_admit(start, true));

        // After the window has passed the old entries are pruned.
        let later = start + Duration::from_millis(150);
        assert!(window.try_admit(later, true));
        assert_eq!(window.current_count(later), 1);
    }

    #[test]
    fn test_disabled_enforcement_still_records() {
        let mut window = SlidingWindow::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(window.try_admit(now, false));
        assert!(window.try_admit(now, false));
        assert!(window.try_admit(now, false));
        assert_eq!(window.current_count(now), 3);
    }

    #[test]
    fn test_log_throttle() {
        let mut throttle = LogThrottle::new(Duration::from_millis(100));
        let start = Instant::now();

        assert!(throttle.should_log(start));
        assert!(!throttle.should_log(start));
        assert!(!throttle.should_log(start + Duration::from_millis(50)));
        assert!(throttle.should_log(start + Duration::from_millis(150)));
        assert!(!throttle.should_log(start + Duration::from_millis(160)));
    }
}
