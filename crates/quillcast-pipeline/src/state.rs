//! Campaign state machine.
//!
//! The working statuses follow [`Stage::ALL`]; `completed` is terminal and
//! `failed` is reachable from every working status. Which stage runs next is
//! derived from the successful artifacts, never from the status alone, so a
//! resume after any crash picks up exactly where persisted work ends.

use quillcast_core::{progress_for, CampaignStatus, Stage};

use crate::error::PipelineError;

/// First stage, in pipeline order, without a successful artifact.
#[must_use]
pub fn next_stage(successful: &[Stage]) -> Option<Stage> {
    Stage::ALL.into_iter().find(|stage| !successful.contains(stage))
}

/// Progress shown for a campaign; `completed` is always 100.
#[must_use]
pub fn progress(status: CampaignStatus, successful: &[Stage]) -> i16 {
    if status.is_completed() {
        return 100;
    }
    let done = Stage::ALL.iter().filter(|s| successful.contains(s)).count();
    // 100 is reserved for completed campaigns
    progress_for(done).min(99)
}

/// Whether `stage` may run now.
///
/// # Errors
///
/// - [`PipelineError::InvalidTransition`] for a completed or failed campaign,
///   or when the previous stage has not succeeded.
/// - [`PipelineError::StageAlreadySucceeded`] when `stage` succeeded before
///   and `rerun` is not set.
pub fn check_can_run(
    status: CampaignStatus,
    stage: Stage,
    successful: &[Stage],
    rerun: bool,
) -> Result<(), PipelineError> {
    if matches!(status, CampaignStatus::Completed | CampaignStatus::Failed) {
        return Err(PipelineError::transition(status, stage));
    }
    if let Some(previous) = stage.previous() {
        if !successful.contains(&previous) {
            return Err(PipelineError::transition(status, stage));
        }
    }
    if successful.contains(&stage) {
        if rerun {
            return Ok(());
        }
        return Err(PipelineError::StageAlreadySucceeded(stage));
    }
    if status.stage() != Some(stage) {
        return Err(PipelineError::transition(status, stage));
    }
    Ok(())
}

/// Status after `stage` succeeded. A rerun of an earlier stage leaves the
/// status where it was.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidTransition`] if `stage` lies ahead of the
/// current status or the campaign is not in a working status.
pub fn status_after_success(
    status: CampaignStatus,
    stage: Stage,
) -> Result<CampaignStatus, PipelineError> {
    let Some(current) = status.stage() else {
        return Err(PipelineError::transition(status, stage));
    };
    if current == stage {
        return Ok(stage.next().map_or(CampaignStatus::Completed, CampaignStatus::from));
    }
    if stage < current {
        return Ok(status);
    }
    Err(PipelineError::transition(status, stage))
}

/// Status a resumed campaign returns to.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidTransition`] for a completed campaign.
pub fn status_for_resume(
    status: CampaignStatus,
    successful: &[Stage],
) -> Result<CampaignStatus, PipelineError> {
    if status.is_completed() {
        return Err(PipelineError::transition(status, "resume"));
    }
    Ok(next_stage(successful).map_or(CampaignStatus::Completed, CampaignStatus::from))
}

/// # Errors
///
/// Returns [`PipelineError::InvalidTransition`] for a completed campaign.
pub fn check_can_fail(status: CampaignStatus) -> Result<(), PipelineError> {
    if status.is_completed() {
        return Err(PipelineError::transition(status, CampaignStatus::Failed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST_THREE: [Stage; 3] = [
        Stage::KeywordResearch,
        Stage::ContentStrategy,
        Stage::SourceDiscovery,
    ];

    #[test]
    fn next_stage_is_first_unsucceeded() {
        assert_eq!(next_stage(&[]), Some(Stage::KeywordResearch));
        assert_eq!(next_stage(&FIRST_THREE), Some(Stage::Writing));
        assert_eq!(next_stage(&Stage::ALL), None);
    }

    #[test]
    fn progress_is_floored_and_capped_until_completed() {
        assert_eq!(progress(CampaignStatus::Writing, &FIRST_THREE), 50);
        assert_eq!(progress(CampaignStatus::Review, &Stage::ALL), 99);
        assert_eq!(progress(CampaignStatus::Completed, &Stage::ALL), 100);
        assert_eq!(progress(CampaignStatus::Failed, &[Stage::KeywordResearch]), 16);
    }

    #[test]
    fn forward_run_requires_matching_status() {
        assert!(check_can_run(CampaignStatus::Writing, Stage::Writing, &FIRST_THREE, false).is_ok());
        assert!(matches!(
            check_can_run(CampaignStatus::Writing, Stage::Humanization, &FIRST_THREE, false),
            Err(PipelineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn succeeded_stage_needs_explicit_rerun() {
        assert!(matches!(
            check_can_run(CampaignStatus::Writing, Stage::ContentStrategy, &FIRST_THREE, false),
            Err(PipelineError::StageAlreadySucceeded(Stage::ContentStrategy))
        ));
        assert!(
            check_can_run(CampaignStatus::Writing, Stage::ContentStrategy, &FIRST_THREE, true)
                .is_ok()
        );
    }

    #[test]
    fn nothing_runs_on_failed_or_completed() {
        for status in [CampaignStatus::Failed, CampaignStatus::Completed] {
            assert!(matches!(
                check_can_run(status, Stage::Writing, &FIRST_THREE, true),
                Err(PipelineError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn success_advances_or_holds_on_rerun() {
        assert_eq!(
            status_after_success(CampaignStatus::Writing, Stage::Writing).unwrap(),
            CampaignStatus::Humanization
        );
        assert_eq!(
            status_after_success(CampaignStatus::Review, Stage::Review).unwrap(),
            CampaignStatus::Completed
        );
        assert_eq!(
            status_after_success(CampaignStatus::Writing, Stage::KeywordResearch).unwrap(),
            CampaignStatus::Writing
        );
        assert!(status_after_success(CampaignStatus::Writing, Stage::Review).is_err());
        assert!(status_after_success(CampaignStatus::Completed, Stage::Review).is_err());
    }

    #[test]
    fn resume_returns_to_next_stage() {
        assert_eq!(
            status_for_resume(CampaignStatus::Failed, &FIRST_THREE).unwrap(),
            CampaignStatus::Writing
        );
        assert_eq!(
            status_for_resume(CampaignStatus::Failed, &Stage::ALL).unwrap(),
            CampaignStatus::Completed
        );
        assert!(status_for_resume(CampaignStatus::Completed, &Stage::ALL).is_err());
    }

    #[test]
    fn completed_cannot_fail() {
        assert!(check_can_fail(CampaignStatus::Writing).is_ok());
        assert!(check_can_fail(CampaignStatus::Completed).is_err());
    }
}
