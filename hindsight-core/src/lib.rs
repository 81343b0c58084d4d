//! # hindsight-core
//!
//! Core library for hindsight - learn from past Claude Code sessions.
//!
//! This library provides:
//! - Transcript store access and project resolution ([`ingest`])
//! - Token-budgeted batching ([`batch`])
//! - Analysis orchestration and response recovery ([`analysis`])
//! - Result merging ([`merge`])
//! - Protection against analyzing its own prompts ([`guard`])
//! - The end-to-end [`pipeline`] and the [`memory`] handoff
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use hindsight_core::analysis::{create_client, NoProgress};
//! use hindsight_core::pipeline::{self, AnalysisRequest, PipelineOutcome};
//! use hindsight_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let client = create_client(&config.llm).expect("failed to create client");
//! let request = AnalysisRequest::new("/home/you/project");
//!
//! match pipeline::run(&request, &config, client.as_ref(), &mut NoProgress) {
//!     PipelineOutcome::Analyzed(analysis) => {
//!         println!("{} recommendations", analysis.report.merged.recommendations.len());
//!     }
//!     PipelineOutcome::NoProject { cwd } => println!("no transcripts for {cwd}"),
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analysis;
pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod guard;
pub mod ingest;
pub mod logging;
pub mod memory;
pub mod merge;
pub mod pipeline;
pub mod types;
