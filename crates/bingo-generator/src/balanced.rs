//! Difficulty-balanced ("SRLv5") boards.
//!
//! Every row, column, and both main diagonals must carry the same total
//! difficulty. Placement works in two phases:
//!
//! 1. **Layout** decides which difficulty sits on each square. Every
//!    layout is built from two orthogonal diagonal Latin squares `A`, `B`
//!    of order 5. Each line holds every symbol of each square exactly
//!    once, so `x[A] + y[B]` gives every line the sum `Σx + Σy`:
//!    - *magic*: `x = 5·σ`, `y = τ + 1`, using each difficulty 1..=25
//!      once (sum 65).
//!    - *tiered*: `x = 0`, `y` = five difficulty tiers, each used five
//!      times.
//!    - *additive*: a bounded search for any `x`, `y` whose 25 pairwise
//!      sums can be drawn from the pool. The two layouts above are
//!      quick special cases of it.
//! 2. **Search** fills each square with a goal of that difficulty and then
//!    shuffles goals between equal-difficulty squares (and the unused
//!    pool) to reduce category overlap along lines. No move changes a
//!    square's difficulty, so the sums hold at every step.
//!
//! ```text
//!  A = (r + 2c) mod 5        B = (2r + c) mod 5
//!  0 2 4 1 3                 0 1 2 3 4
//!  1 3 0 2 4                 2 3 4 0 1
//!  2 4 1 3 0                 4 0 1 2 3
//!  3 0 2 4 1                 1 2 3 4 0
//!  4 1 3 0 2                 3 4 0 1 2
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use bingo_protocol::{BOARD_CELLS, BOARD_SIZE};

use crate::{GeneratorError, Goal, distinct};

/// Goals per difficulty tier in the tiered layout.
const TIER_SIZE: usize = BOARD_SIZE;

/// Local search budget.
const SEARCH_ITERATIONS: usize = 2000;

/// Node budget for the additive layout search.
const LAYOUT_NODES: usize = 100_000;

type Buckets<'a> = BTreeMap<u8, Vec<&'a Goal>>;

pub(crate) fn generate<R: Rng + ?Sized>(
    goals: &[Goal],
    rng: &mut R,
) -> Result<Vec<Goal>, GeneratorError> {
    if goals.is_empty() {
        return Err(GeneratorError::EmptyPool);
    }

    let mut buckets = Buckets::new();
    for goal in distinct(goals) {
        if let Some(difficulty) = goal.rated_difficulty() {
            buckets.entry(difficulty).or_default().push(goal);
        }
    }
    let eligible = buckets.values().map(Vec::len).sum();
    for bucket in buckets.values_mut() {
        bucket.shuffle(rng);
    }

    let layout = magic_layout(&buckets, rng)
        .or_else(|| tiered_layout(&buckets, rng))
        .or_else(|| additive_layout(&buckets, rng))
        .ok_or(GeneratorError::Unbalanceable { eligible })?;

    // Whatever isn't placed stays in `buckets` as the search's spare pool.
    let mut board = Vec::with_capacity(BOARD_CELLS);
    for difficulty in layout {
        let goal = buckets
            .get_mut(&difficulty)
            .and_then(Vec::pop)
            .ok_or(GeneratorError::Unbalanceable { eligible })?;
        board.push(goal);
    }

    reduce_overlap(&mut board, &mut buckets, rng);
    Ok(board.into_iter().cloned().collect())
}

fn latin_a(row: usize, col: usize) -> usize {
    (row + 2 * col) % BOARD_SIZE
}

fn latin_b(row: usize, col: usize) -> usize {
    (2 * row + col) % BOARD_SIZE
}

fn permutation<R: Rng + ?Sized>(rng: &mut R) -> [usize; BOARD_SIZE] {
    let mut symbols: [usize; BOARD_SIZE] = std::array::from_fn(|i| i);
    symbols.shuffle(rng);
    symbols
}

/// Needs at least one goal of every difficulty 1..=25.
fn magic_layout<R: Rng + ?Sized>(
    buckets: &Buckets<'_>,
    rng: &mut R,
) -> Option<[u8; BOARD_CELLS]> {
    let complete = (1..=crate::MAX_DIFFICULTY)
        .all(|d| buckets.get(&d).is_some_and(|b| !b.is_empty()));
    if !complete {
        return None;
    }

    let major = permutation(rng);
    let minor = permutation(rng);
    Some(std::array::from_fn(|i| {
        let (row, col) = (i / BOARD_SIZE, i % BOARD_SIZE);
        let value =
            BOARD_SIZE * major[latin_a(row, col)] + minor[latin_b(row, col)] + 1;
        value as u8
    }))
}

/// Needs five tiers of five goals. A difficulty with ten goals can fill
/// two tiers, and so on.
fn tiered_layout<R: Rng + ?Sized>(
    buckets: &Buckets<'_>,
    rng: &mut R,
) -> Option<[u8; BOARD_CELLS]> {
    let mut tiers: Vec<u8> = buckets
        .iter()
        .flat_map(|(&d, goals)| std::iter::repeat_n(d, goals.len() / TIER_SIZE))
        .collect();
    if tiers.len() < BOARD_SIZE {
        return None;
    }
    tiers.shuffle(rng);

    let square = if rng.random_bool(0.5) { latin_a } else { latin_b };
    Some(std::array::from_fn(|i| {
        tiers[square(i / BOARD_SIZE, i % BOARD_SIZE)]
    }))
}

/// Remaining goals per difficulty, indexed by difficulty.
type Counts = [usize; crate::MAX_DIFFICULTY as usize + 1];

/// Finds offsets `x` and bases `y` such that every `x[i] + y[j]` can be
/// drawn from the pool, then lays them out over the two Latin squares
/// under random symbol permutations.
fn additive_layout<R: Rng + ?Sized>(
    buckets: &Buckets<'_>,
    rng: &mut R,
) -> Option<[u8; BOARD_CELLS]> {
    let mut counts: Counts = [0; crate::MAX_DIFFICULTY as usize + 1];
    for (&difficulty, goals) in buckets {
        counts[usize::from(difficulty)] = goals.len();
    }
    if counts.iter().sum::<usize>() < BOARD_CELLS {
        return None;
    }

    let mut search = AdditiveSearch {
        counts,
        budget: LAYOUT_NODES,
        x: vec![0],
        y: Vec::with_capacity(BOARD_SIZE),
    };
    if !search.extend_x(rng) {
        tracing::debug!(nodes = LAYOUT_NODES - search.budget, "no additive layout");
        return None;
    }

    let (x, y) = (search.x, search.y);
    let (sigma, tau) = (permutation(rng), permutation(rng));
    let transpose = rng.random_bool(0.5);
    Some(std::array::from_fn(|i| {
        let (row, col) = (i / BOARD_SIZE, i % BOARD_SIZE);
        let (a, b) = if transpose {
            (latin_b(row, col), latin_a(row, col))
        } else {
            (latin_a(row, col), latin_b(row, col))
        };
        x[sigma[a]] + y[tau[b]]
    }))
}

/// Depth-first search over sorted `x` (with `x[0] = 0`) and sorted `y`.
/// Any solution can be shifted and reordered into that form.
struct AdditiveSearch {
    counts: Counts,
    budget: usize,
    x: Vec<u8>,
    y: Vec<u8>,
}

impl AdditiveSearch {
    fn spend(&mut self) -> bool {
        if self.budget == 0 {
            return false;
        }
        self.budget -= 1;
        true
    }

    fn top(&self) -> u8 {
        self.x.last().copied().unwrap_or(0)
    }

    fn extend_x<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.x.len() == BOARD_SIZE {
            return self.extend_y(rng);
        }
        let mut candidates: Vec<u8> = (self.top()..crate::MAX_DIFFICULTY).collect();
        candidates.shuffle(rng);
        for offset in candidates {
            if !self.spend() {
                return false;
            }
            self.x.push(offset);
            if self.capacity(1) >= BOARD_SIZE && self.extend_x(rng) {
                return true;
            }
            self.x.pop();
        }
        false
    }

    fn extend_y<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.y.len() == BOARD_SIZE {
            return true;
        }
        let low = self.y.last().copied().unwrap_or(1);
        if self.capacity(low) < BOARD_SIZE - self.y.len() {
            return false;
        }
        let mut candidates: Vec<u8> = (low..=crate::MAX_DIFFICULTY - self.top()).collect();
        candidates.shuffle(rng);
        for base in candidates {
            if !self.spend() {
                return false;
            }
            if !self.fits(base) {
                continue;
            }
            self.draw(base, false);
            self.y.push(base);
            if self.extend_y(rng) {
                return true;
            }
            self.y.pop();
            self.draw(base, true);
        }
        false
    }

    fn fits(&self, base: u8) -> bool {
        self.repeats(base) > 0
    }

    /// How many more times `base` could join `y` with what is left.
    fn repeats(&self, base: u8) -> usize {
        // `x` is sorted, so equal offsets are adjacent.
        self.x
            .chunk_by(|a, b| a == b)
            .map(|run| self.counts[usize::from(base + run[0])] / run.len())
            .min()
            .unwrap_or(0)
    }

    /// Upper bound on how many bases from `low` up can still be added.
    fn capacity(&self, low: u8) -> usize {
        (low..=crate::MAX_DIFFICULTY - self.top())
            .map(|base| self.repeats(base))
            .sum()
    }

    fn draw(&mut self, base: u8, undo: bool) {
        for &offset in &self.x {
            let slot = &mut self.counts[usize::from(base + offset)];
            if undo {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
}

/// Index lists of the 12 lines: rows, columns, then both diagonals.
pub(crate) fn lines() -> Vec<[usize; BOARD_SIZE]> {
    let mut lines = Vec::with_capacity(2 * BOARD_SIZE + 2);
    for i in 0..BOARD_SIZE {
        lines.push(std::array::from_fn(|j| i * BOARD_SIZE + j));
        lines.push(std::array::from_fn(|j| j * BOARD_SIZE + i));
    }
    lines.push(std::array::from_fn(|j| j * BOARD_SIZE + j));
    lines.push(std::array::from_fn(|j| j * BOARD_SIZE + (BOARD_SIZE - 1 - j)));
    lines
}

fn shared_categories(a: &Goal, b: &Goal) -> usize {
    a.categories
        .iter()
        .filter(|c| b.categories.contains(c))
        .count()
}

/// Total category overlap over every pair of goals sharing a line.
pub(crate) fn overlap(board: &[&Goal], lines: &[[usize; BOARD_SIZE]]) -> usize {
    lines
        .iter()
        .map(|line| {
            let mut shared = 0;
            for (i, &a) in line.iter().enumerate() {
                for &b in &line[i + 1..] {
                    shared += shared_categories(board[a], board[b]);
                }
            }
            shared
        })
        .sum()
}

fn reduce_overlap<'a, R: Rng + ?Sized>(
    board: &mut [&'a Goal],
    spare: &mut Buckets<'a>,
    rng: &mut R,
) {
    let lines = lines();
    let mut cost = overlap(board, &lines);

    for _ in 0..SEARCH_ITERATIONS {
        if cost == 0 {
            break;
        }
        let a = rng.random_range(0..board.len());
        let Some(difficulty) = board[a].rated_difficulty() else {
            continue;
        };

        if rng.random_bool(0.5) {
            let partners: Vec<usize> = (0..board.len())
                .filter(|&b| {
                    b != a && board[b].rated_difficulty() == Some(difficulty)
                })
                .collect();
            let Some(&b) = partners.choose(rng) else {
                continue;
            };
            board.swap(a, b);
            let next = overlap(board, &lines);
            if next <= cost {
                cost = next;
            } else {
                board.swap(a, b);
            }
        } else {
            let Some(bucket) = spare.get_mut(&difficulty) else {
                continue;
            };
            if bucket.is_empty() {
                continue;
            }
            let k = rng.random_range(0..bucket.len());
            std::mem::swap(&mut board[a], &mut bucket[k]);
            let next = overlap(board, &lines);
            if next <= cost {
                cost = next;
            } else {
                std::mem::swap(&mut board[a], &mut bucket[k]);
            }
        }
    }

    tracing::debug!(overlap = cost, "balanced board search finished");
}
