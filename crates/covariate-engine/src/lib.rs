//! Covariate Engine
//!
//! Builds GLM design matrices from gds scripts. A script opens sessions,
//! declares timing (TR, sampling resolution, scans, condition function) and
//! then creates, modifies, expands and prunes typed covariates through
//! `newcov`, `modcov`, `modcov+` and `chkeff` sections. Each valid session is
//! written as a scan-resolution `.G` matrix and a fine-resolution `.preG`
//! matrix.

mod compound;
mod condition;
mod config;
mod covariate;
mod directives;
mod efficiency;
mod engine;
mod error;
mod generators;
mod materialize;
mod modifier;
mod numlist;
mod output;
mod params;
mod section;
mod session;
mod tokenizer;

pub use condition::ConditionFunction;
pub use config::EngineConfig;
pub use covariate::{CovType, Covariate, GROUP_SEPARATOR};
pub use engine::{CovariateSummary, Engine, Location, RunReport, SessionReport};
pub use error::{Diagnostic, ErrorKind, GdsError, Severity};
pub use output::{open_g, LoadedMatrix};
pub use params::Timing;
pub use session::Session;
pub use tokenizer::tokenize;
