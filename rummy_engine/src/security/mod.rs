//! Abuse protection for socket traffic.
//!
//! Every socket owns an `EventThrottle`. By default at most one `status`
//! event is accepted per 500 ms window; excess events are answered with
//! `RATE_LIMITED` and dropped.
//!
//! ## Example
//!
//! ```
//! use rummy_engine::security::{EventThrottle, ThrottleConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut throttle = EventThrottle::new(ThrottleConfig::default());
//! assert!(throttle.check("status").is_allowed());
//! assert!(!throttle.check("status").is_allowed());
//! # }
//! ```

pub mod rate_limiter;

pub use rate_limiter::{DEFAULT_THROTTLE_WINDOW, EventThrottle, ThrottleConfig, ThrottleResult};
