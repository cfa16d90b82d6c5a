//! Uniform random boards.

use rand::Rng;
use rand::seq::SliceRandom;

use bingo_protocol::BOARD_CELLS;

use crate::{Goal, GeneratorError, distinct};

/// Draws up to 25 goals without replacement, in shuffled order.
///
/// A pool smaller than a board yields every goal; the caller tiles the
/// result and leaves the rest of the board blank.
pub(crate) fn generate<R: Rng + ?Sized>(
    goals: &[Goal],
    rng: &mut R,
) -> Result<Vec<Goal>, GeneratorError> {
    let mut pool = distinct(goals);
    if pool.is_empty() {
        return Err(GeneratorError::EmptyPool);
    }
    if pool.len() < BOARD_CELLS {
        tracing::warn!(
            available = pool.len(),
            "goal pool smaller than a board, filling what we can"
        );
    }

    pool.shuffle(rng);
    Ok(pool.into_iter().take(BOARD_CELLS).cloned().collect())
}
