use thiserror::Error;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid batch plan: {0}")]
    InvalidPlan(String),

    #[error("plan covers {planned} units but {given} were supplied")]
    UnitCountMismatch { planned: u32, given: usize },
}

pub type RolloutResult<T> = Result<T, RolloutError>;
