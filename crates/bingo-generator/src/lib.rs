//! Bingo board generation.
//!
//! Turns a game's goal pool into the 25 goals of a board, row-major:
//!
//! - [`GenerationMode::Random`]: a uniform shuffle.
//! - [`GenerationMode::Balanced`] ("SRLv5"): every row, column, and main
//!   diagonal has the same total difficulty, with category overlap along
//!   lines kept low.
//!
//! The result is a flat list; tile it with
//! [`Board::from_cells`](bingo_protocol::Board::from_cells).
//!
//! ```rust
//! use bingo_generator::{Goal, generate};
//! use bingo_protocol::GenerationMode;
//!
//! let pool: Vec<Goal> = (0..30).map(|i| Goal::new(format!("goal {i}"))).collect();
//! let board = generate(&pool, GenerationMode::Random).unwrap();
//! assert_eq!(board.len(), 25);
//! ```

mod balanced;
mod error;
mod random;

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use bingo_protocol::{Cell, GenerationMode};

pub use error::GeneratorError;

/// Highest difficulty a goal can be rated.
pub const MAX_DIFFICULTY: u8 = 25;

/// One entry of a game's goal list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub goal: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1..=25. Unrated goals only appear on random boards.
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Goal {
    /// An unrated goal with no description or categories.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            description: None,
            difficulty: None,
            categories: Vec::new(),
        }
    }

    /// The difficulty, if it's within 1..=25.
    pub fn rated_difficulty(&self) -> Option<u8> {
        self.difficulty
            .filter(|d| (1..=MAX_DIFFICULTY).contains(d))
    }
}

impl From<Goal> for Cell {
    fn from(goal: Goal) -> Self {
        Cell::new(goal.goal, goal.description)
    }
}

/// Generates a board's goals using the thread-local RNG.
///
/// # Errors
/// - [`GeneratorError::EmptyPool`]: no goals.
/// - [`GeneratorError::Unbalanceable`]: balanced mode, and no layout with
///   equal line sums fits the pool's difficulties.
pub fn generate(
    goals: &[Goal],
    mode: GenerationMode,
) -> Result<Vec<Goal>, GeneratorError> {
    generate_with(goals, mode, &mut rand::rng())
}

/// Like [`generate`], with a caller-supplied RNG (seed a `StdRng` for
/// reproducible boards).
pub fn generate_with<R: Rng + ?Sized>(
    goals: &[Goal],
    mode: GenerationMode,
    rng: &mut R,
) -> Result<Vec<Goal>, GeneratorError> {
    match mode {
        GenerationMode::Random => random::generate(goals, rng),
        GenerationMode::Balanced => balanced::generate(goals, rng),
    }
}

/// The pool with repeated goal texts dropped (first occurrence wins).
fn distinct(goals: &[Goal]) -> Vec<&Goal> {
    let mut seen = HashSet::new();
    goals
        .iter()
        .filter(|g| seen.insert(g.goal.as_str()))
        .collect()
}
