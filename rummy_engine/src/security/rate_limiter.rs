//! Per-socket event throttling.

use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Default minimum spacing between two throttled events of one kind.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(500);

/// Throttle configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum time between two accepted events of the same kind
    pub window: Duration,

    /// Event names subject to the throttle; others always pass
    pub events: Vec<String>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_THROTTLE_WINDOW,
            events: vec!["status".to_string()],
        }
    }
}

impl ThrottleConfig {
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

/// Throttle decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleResult {
    Allowed,
    /// Dropped; the next event of this kind is accepted after `retry_after`
    Limited { retry_after: Duration },
}

impl ThrottleResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleResult::Allowed)
    }
}

/// Throttle owned by one socket. Excess events are dropped, never queued.
#[derive(Debug)]
pub struct EventThrottle {
    config: ThrottleConfig,
    last_accepted: HashMap<String, Instant>,
}

impl EventThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            last_accepted: HashMap::new(),
        }
    }

    /// Checks an incoming event and records it when accepted.
    pub fn check(&mut self, event: &str) -> ThrottleResult {
        if !self.config.events.iter().any(|e| e == event) {
            return ThrottleResult::Allowed;
        }
        let now = Instant::now();
        if let Some(last) = self.last_accepted.get(event) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.config.window {
                return ThrottleResult::Limited {
                    retry_after: self.config.window - elapsed,
                };
            }
        }
        self.last_accepted.insert(event.to_string(), now);
        ThrottleResult::Allowed
    }
}
