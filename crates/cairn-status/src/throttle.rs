//! Request rate limiting.

use chrono::Utc;

/// Allows at most one status request per wall-clock second.
#[derive(Debug, Clone, Default)]
pub struct RequestThrottle {
    last: i64,
}

impl RequestThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a request may go out now.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Utc::now().timestamp())
    }

    /// Same as [`ready`](Self::ready) with an explicit clock reading.
    ///
    /// A clock that went backwards resets the reference point without
    /// allowing a request.
    pub fn ready_at(&mut self, now: i64) -> bool {
        let diff = now - self.last;
        if diff < 1 {
            if diff < 0 {
                self.last = now;
            }
            return false;
        }
        self.last = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_per_second() {
        let mut throttle = RequestThrottle::new();
        assert!(throttle.ready_at(100));
        assert!(!throttle.ready_at(100));
        assert!(throttle.ready_at(101));
        assert!(throttle.ready_at(105));
    }

    #[test]
    fn test_clock_moved_back() {
        let mut throttle = RequestThrottle::new();
        assert!(throttle.ready_at(100));
        assert!(!throttle.ready_at(50));
        assert!(!throttle.ready_at(50));
        assert!(throttle.ready_at(51));
    }
}
