//! tgraph-exec: the async driver that runs a transition graph to the end.
//!
//! # Components
//!
//! - **`driver`**: single-writer event loop around `tgraph_core::Transition`
//! - **`executor`**: the `ActionExecutor` seam and per-action completion handles
//! - **`simulate`**: an in-process executor for dry runs and tests
//! - **`config`**: engine configuration loaded from TOML
//!
//! # Architecture
//!
//! ```text
//! DriverHandle ──abort──┐
//! CompletionHandle ─────┼──> mpsc ──> Driver ──dispatch──> ActionExecutor
//! action timers ────────┘             (sole writer)          (runs actions)
//! ```

pub mod config;
pub mod driver;
pub mod executor;
pub mod simulate;

pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use driver::{Driver, DriverHandle, TransitionReport, drive};
pub use executor::{ActionExecutor, CompletionHandle};
pub use simulate::{ExecutionLog, SimulatedExecutor};
