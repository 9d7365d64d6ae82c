//! # ralph-loop
//!
//! An autonomous Observe-Reflect-Act iteration driver: it wraps an external
//! AI coding assistant (reachable as a CLI subprocess, an in-process SDK
//! session, or a loaded plugin) behind a resilient execution loop with
//! retries, a circuit breaker, session pooling, and crash-recoverable
//! history.
//!
//! The entry point is [`client::LoopClient`], assembled from:
//!
//! - [`router`] — picks an [`adapters::Executor`] per task
//! - [`retry`] — backoff/jitter policy wrapping each executor call
//! - [`circuit`] — trips open after repeated no-progress or same-error runs
//! - [`pool`] — bounds and expires long-lived executor sessions
//! - [`context`] and [`persistence`] — bounded in-memory history with
//!   crash-recoverable snapshots
//! - [`parser`], [`analyzer`], [`prompt`], [`exit_detector`] — turn raw
//!   executor output into a completion/stuck/graceful-exit verdict
//!
//! See `SPEC_FULL.md` for the full behavioral contract.

pub mod adapters;
pub mod analyzer;
pub mod circuit;
pub mod client;
pub mod context;
pub mod errors;
pub mod exit_detector;
pub mod fingerprint;
pub mod model;
pub mod observability;
pub mod parser;
pub mod persistence;
pub mod pool;
pub mod prompt;
pub mod recovery;
pub mod retry;
pub mod router;

pub use client::{LoopClient, LoopObserver};
pub use errors::{ErrorCategory, LoopError, Result};
pub use model::{AdapterKind, CompletionStatus, ExecutionContext, LoopResult, Task};
pub use router::{ExecutorRouter, RouterMode};
