//! Error types for board generation.

/// Errors that can occur while generating a board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    /// The goal pool has no goals at all.
    #[error("goal pool is empty")]
    EmptyPool,

    /// No board with equal line sums can be built from the pool's
    /// difficulties. `eligible` counts goals with a difficulty in 1..=25.
    #[error("cannot build a balanced board from {eligible} rated goals")]
    Unbalanceable { eligible: usize },
}
