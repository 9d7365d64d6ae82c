//! Failure detection and recovery coordination.
//!
//! Detectors classify *why* an adapter call failed; strategies attempt to
//! repair side state (reconnect a session, restore state, fall back) so the
//! next retry attempt has a better chance. Per `spec.md` §4.1 step 5, this
//! pipeline runs outside the retry decision — it never changes whether a
//! retry happens, only what state the next attempt sees.

pub mod detectors;
pub mod strategies;

pub use detectors::{ConnectionDetector, ErrorRateDetector, FailureDetector, HealthCheckDetector, TimeoutDetector};
pub use strategies::{AutoReconnect, Fallback, RecoveryCoordinator, RecoveryStrategy, SessionRestore};
