//! Reading aggregation and pass/fail verdicts.

pub mod aggregator;
pub mod model;

pub use aggregator::analyze;
pub use model::TestRun;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("no readings to analyze")]
    EmptyInput,
}
