//! Campaign state machine and the orchestrator that runs stages against it.

mod analyzer;
pub mod error;
pub mod orchestrator;
pub mod setup;
pub mod state;

pub use error::PipelineError;
pub use orchestrator::{
    Orchestrator, PipelineConfig, RunOutcome, StageReport, StageResult, SOURCE_FETCH_ERROR,
};
pub use setup::QuickSetup;
pub use state::{check_can_fail, check_can_run, next_stage, progress, status_after_success, status_for_resume};
