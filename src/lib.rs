//! Few-trial adaptation over a precomputed behaviour archive.
//!
//! An archive of (simulated fitness, descriptor, controller) entries is built
//! offline under nominal dynamics. When the real dynamics change, the
//! [`adaptation::AdaptationLoop`] models the gap between simulated and real
//! fitness over descriptor space with a Gaussian process, corrects the archive
//! after every real trial, and picks the next controller by UCB until one
//! performs well enough or the trial budget runs out.

pub mod acquisition;
pub mod adaptation;
pub mod archive;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod experiment;
pub mod model;
pub mod util;

pub use adaptation::{AdaptationLoop, RunResult, Termination};
pub use config::{AdaptationConfig, KernelConfig};
pub use error::{AdaptError, ArchiveError, ConfigError, ModelError};
pub use evaluator::{EvalOutcome, Evaluator};
