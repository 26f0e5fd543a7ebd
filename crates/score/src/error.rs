use extract::ExtractError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScoreError {
    #[error(transparent)]
    Capability(#[from] ExtractError),

    /// The scorer answered with a strength outside the unit interval
    #[error("strength {value} is outside [0, 1]")]
    OutOfRange { value: f64 },
}
