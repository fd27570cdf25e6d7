use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeat reads of the same card within a cool-down window.
///
/// A single tap is often sensed several times while the card dwells on the
/// reader; only the first read starts a resolution. Owned by the reader loop,
/// so it needs no locking.
pub struct CardDebouncer {
    window: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl CardDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if this observation should be resolved.
    ///
    /// Rejections do not extend the window: the cool-down counts from the
    /// last accepted read.
    pub fn observe(&mut self, identifier: &str, now: Instant) -> bool {
        // Forget cards whose cool-down has elapsed
        let window = self.window;
        self.last_accepted
            .retain(|_, accepted| now.saturating_duration_since(*accepted) < window);

        if self.last_accepted.contains_key(identifier) {
            return false;
        }

        self.last_accepted.insert(identifier.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_accepted() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        assert!(debouncer.observe("F637CF05", Instant::now()));
    }

    #[test]
    fn repeat_within_window_is_rejected() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(debouncer.observe("F637CF05", start));
        assert!(!debouncer.observe("F637CF05", start + Duration::from_millis(300)));
        assert!(!debouncer.observe("F637CF05", start + Duration::from_secs(2)));
    }

    #[test]
    fn repeat_after_window_is_accepted() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(debouncer.observe("F637CF05", start));
        assert!(debouncer.observe("F637CF05", start + Duration::from_secs(5)));
        assert!(debouncer.observe("F637CF05", start + Duration::from_secs(11)));
    }

    #[test]
    fn rejections_do_not_extend_window() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(debouncer.observe("F637CF05", start));
        assert!(!debouncer.observe("F637CF05", start + Duration::from_secs(4)));
        assert!(debouncer.observe("F637CF05", start + Duration::from_secs(6)));
    }

    #[test]
    fn cards_are_independent() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(debouncer.observe("AAAA0001", start));
        assert!(debouncer.observe("BBBB0002", start + Duration::from_millis(10)));
        assert!(!debouncer.observe("AAAA0001", start + Duration::from_millis(20)));
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let mut debouncer = CardDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        for n in 0..100 {
            debouncer.observe(&format!("{:08X}", n), start);
        }
        debouncer.observe("FFFFFFFF", start + Duration::from_secs(10));
        assert_eq!(debouncer.last_accepted.len(), 1);
    }
}
