use crate::estimator::EstimationMode;
use crate::homography::SolveError;

/// Why a single step of the estimation cascade produced no matrix.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    #[error("no consensus (best subset had {best_inliers} inliers, need {needed})")]
    NoConsensus { best_inliers: usize, needed: usize },
    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// One failed cascade step, kept for the final report.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub mode: EstimationMode,
    pub failure: AttemptFailure,
}

/// Calibration-stage errors. All of them are fatal for a transformation run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {needed} correspondence points, got {got}")]
    InsufficientPoints { needed: usize, got: usize },
    #[error("degenerate correspondence configuration: {0}")]
    DegenerateConfiguration(SolveError),
    #[error("no homography could be estimated: {}", describe_attempts(.attempts))]
    HomographyUnavailable { attempts: Vec<FailedAttempt> },
}

fn describe_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.mode, a.failure))
        .collect::<Vec<_>>()
        .join("; ")
}
