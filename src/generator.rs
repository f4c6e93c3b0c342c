use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::cell::{self, UNCOMPUTED};
use crate::grid::SharedGrid;

/// Per-index claim table used while the shuffle workers run.
///
/// A raw load/exchange/store swap sequence is not multiset-preserving when two
/// workers race on the same index, so each pair swap claims both slots first.
/// Claims are taken in ascending index order, which rules out deadlock.
struct ClaimTable {
    slots: Box<[AtomicBool]>,
}

impl ClaimTable {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn acquire(&self, index: usize) {
        while self.slots[index]
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn release(&self, index: usize) {
        self.slots[index].store(false, Ordering::Release);
    }

    fn acquire_pair(&self, a: usize, b: usize) {
        self.acquire(a.min(b));
        self.acquire(a.max(b));
    }

    fn release_pair(&self, a: usize, b: usize) {
        self.release(a.max(b));
        self.release(a.min(b));
    }
}

/// Permutes mine placement across the whole buffer with `workers` threads and
/// returns the surviving first-click safety candidates.
///
/// Worker `k` visits indices `k, k + workers, k + 2 * workers, ...` and swaps
/// each with a uniformly chosen index in `[i, size)`. The claim protocol keeps
/// the value multiset exact, so the board always ends up with precisely the
/// requested number of mines; with a single worker the result is a sequential
/// Fisher-Yates shuffle, with several the interleaving order of cross-range
/// swaps is scheduler-dependent and the distribution is only near-uniform.
pub(crate) fn shuffle_mines(grid: &SharedGrid, workers: usize, seed: u64) -> Vec<usize> {
    let started = Instant::now();
    let claims = ClaimTable::new(grid.size());

    let candidates: Vec<Option<usize>> = thread::scope(|scope| {
        let claims = &claims;
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let rng = SmallRng::seed_from_u64(worker_seed(seed, worker));
                scope.spawn(move || shuffle_stride(grid, claims, worker, workers, rng))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().ok().flatten())
            .collect()
    });

    // A later cross-range swap can move a mine onto a recorded candidate, so
    // candidates are re-checked once all workers have joined.
    let candidates: Vec<usize> = candidates
        .into_iter()
        .flatten()
        .filter(|&index| !cell::is_mine_raw(grid.load(index)))
        .collect();

    log::debug!(
        "shuffled {} cells across {} workers in {:?}",
        grid.size(),
        workers,
        started.elapsed()
    );
    candidates
}

fn worker_seed(seed: u64, worker: usize) -> u64 {
    seed ^ (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn shuffle_stride(
    grid: &SharedGrid,
    claims: &ClaimTable,
    start: usize,
    stride: usize,
    mut rng: SmallRng,
) -> Option<usize> {
    let size = grid.size();
    let mut candidate = None;

    for i in (start..size.saturating_sub(1)).step_by(stride) {
        let j = rng.random_range(i..size);
        if j != i {
            claims.acquire_pair(i, j);
            let a = grid.load(i);
            let b = grid.load(j);
            grid.store(i, b);
            grid.store(j, a);
            claims.release_pair(i, j);
        }

        if candidate.is_none() && !cell::is_mine_raw(grid.load(i)) {
            candidate = Some(i);
        }
    }
    candidate
}

/// Computes the mine-neighbor count of every still-uncomputed cell.
///
/// Worker `k` owns columns `k, k + workers, ...`, so no two workers ever
/// target the same cell in this phase. Counts stay in the hidden band; mine
/// cells are skipped because they never carry a count.
pub(crate) fn compute_neighbor_counts(grid: &SharedGrid, workers: usize) {
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..workers {
            scope.spawn(move || count_column_stride(grid, worker, workers));
        }
    });

    log::debug!("neighbor counts computed in {:?}", started.elapsed());
}

fn count_column_stride(grid: &SharedGrid, start_column: usize, stride: usize) {
    for column in (start_column..grid.width()).step_by(stride) {
        for row in 0..grid.height() {
            let Some(index) = grid.index(column, row) else {
                continue;
            };
            if grid.load(index) != UNCOMPUTED {
                continue;
            }
            grid.store(index, grid.adjacent_mine_count(index) as i8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::MINE;
    use crate::GameConfig;

    fn oracle_count(grid: &SharedGrid, index: usize) -> u8 {
        let (column, row) = grid.coords(index);
        let mut count = 0;
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nc = column as i64 + dx;
                let nr = row as i64 + dy;
                if nc < 0 || nr < 0 || nc >= grid.width() as i64 || nr >= grid.height() as i64 {
                    continue;
                }
                let neighbor = grid.index(nc as usize, nr as usize).unwrap();
                if grid.load(neighbor) % 10 == MINE {
                    count += 1;
                }
            }
        }
        count
    }

    fn mines_on_board(grid: &SharedGrid) -> usize {
        (0..grid.size())
            .filter(|&index| grid.load(index) % 10 == MINE)
            .count()
    }

    #[test]
    fn shuffle_preserves_the_exact_mine_count() {
        for seed in 0..8 {
            let grid = SharedGrid::new(GameConfig::new(30, 30, 200).unwrap());
            shuffle_mines(&grid, 4, seed);
            assert_eq!(mines_on_board(&grid), 200);
        }
    }

    #[test]
    fn shuffle_candidates_are_never_mines() {
        for seed in 0..8 {
            let grid = SharedGrid::new(GameConfig::new(16, 16, 40).unwrap());
            for candidate in shuffle_mines(&grid, 4, seed) {
                assert!(grid.load(candidate) % 10 != MINE);
            }
        }
    }

    #[test]
    fn neighbor_counts_match_a_brute_force_oracle() {
        for seed in 0..4 {
            let grid = SharedGrid::new(GameConfig::new(16, 16, 40).unwrap());
            shuffle_mines(&grid, 4, seed);
            compute_neighbor_counts(&grid, 4);

            for index in 0..grid.size() {
                let value = grid.load(index);
                assert_ne!(value, UNCOMPUTED);
                if value != MINE {
                    assert_eq!(value as u8, oracle_count(&grid, index));
                }
            }
        }
    }

    #[test]
    fn single_worker_shuffle_is_deterministic() {
        let run = |seed| {
            let grid = SharedGrid::new(GameConfig::new(9, 9, 10).unwrap());
            shuffle_mines(&grid, 1, seed);
            (0..grid.size()).map(|i| grid.load(i)).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn counting_pass_works_on_rectangular_boards() {
        let grid = SharedGrid::from_mine_indices(7, 3, &[0, 10, 20]).unwrap();
        compute_neighbor_counts(&grid, 4);
        for index in 0..grid.size() {
            let value = grid.load(index);
            assert_ne!(value, UNCOMPUTED);
            if value != MINE {
                assert_eq!(value as u8, oracle_count(&grid, index));
            }
        }
    }
}
