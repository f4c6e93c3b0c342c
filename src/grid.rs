use std::sync::atomic::{AtomicI8, Ordering};

use crate::cell::{self, Cell, MINE, UNCOMPUTED};
use crate::{GameConfig, GridError, Result};

const DISPLACEMENTS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Fixed-size cell buffer shared between the engine and its worker threads.
///
/// One `AtomicI8` per cell; there is no plain load/store path, because worker
/// threads mutate the buffer concurrently with no higher-level locking. The
/// linear layout keeps `height` as the stride: `index = height * column + row`.
pub struct SharedGrid {
    cells: Box<[AtomicI8]>,
    width: usize,
    height: usize,
    mines: usize,
}

impl SharedGrid {
    /// Allocates the buffer with mines packed into `[0, mines)` and every
    /// remaining cell marked uncomputed, ready for the shuffle pass.
    pub fn new(config: GameConfig) -> Self {
        let size = config.size();
        let mines = config.mines();
        let cells = (0..size)
            .map(|i| AtomicI8::new(if i < mines { MINE } else { UNCOMPUTED }))
            .collect();
        Self {
            cells,
            width: config.width(),
            height: config.height(),
            mines,
        }
    }

    /// Builds a buffer with mines at the given linear indices, leaving every
    /// other cell uncomputed. Duplicate indices collapse to one mine.
    pub fn from_mine_indices(width: usize, height: usize, mine_indices: &[usize]) -> Result<Self> {
        let size = width.saturating_mul(height);
        let cells: Box<[AtomicI8]> = (0..size).map(|_| AtomicI8::new(UNCOMPUTED)).collect();

        let mut mines = 0;
        for &index in mine_indices {
            if index >= size {
                return Err(GridError::InvalidCoords);
            }
            if cells[index].swap(MINE, Ordering::SeqCst) != MINE {
                mines += 1;
            }
        }
        if mines >= size {
            return Err(GridError::TooManyMines);
        }

        Ok(Self {
            cells,
            width,
            height,
            mines,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn mine_count(&self) -> usize {
        self.mines
    }

    pub fn safe_cell_count(&self) -> usize {
        self.size() - self.mines
    }

    pub fn load(&self, index: usize) -> i8 {
        self.cells[index].load(Ordering::SeqCst)
    }

    pub fn store(&self, index: usize, value: i8) {
        self.cells[index].store(value, Ordering::SeqCst);
    }

    pub fn swap(&self, index: usize, value: i8) -> i8 {
        self.cells[index].swap(value, Ordering::SeqCst)
    }

    pub fn compare_exchange(
        &self,
        index: usize,
        current: i8,
        new: i8,
    ) -> core::result::Result<i8, i8> {
        self.cells[index].compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// Decoded view of the cell at `index`.
    pub fn cell(&self, index: usize) -> Result<Cell> {
        Cell::from_raw(self.load(index))
    }

    /// Linear index for `(column, row)`, or `None` when either axis is out of
    /// bounds. Callers treat `None` as a normal "no such neighbor" signal.
    pub fn index(&self, column: usize, row: usize) -> Option<usize> {
        if column >= self.width || row >= self.height {
            return None;
        }
        Some(self.height * column + row)
    }

    /// Inverse of [`SharedGrid::index`].
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index / self.height, index % self.height)
    }

    /// Indices of the up-to-8 in-bounds neighbors of `index`, each offset
    /// bounds-checked individually.
    pub fn neighbors(&self, index: usize) -> NeighborIter<'_> {
        NeighborIter {
            grid: self,
            center: self.coords(index),
            at: 0,
        }
    }

    pub fn adjacent_mine_count(&self, index: usize) -> u8 {
        self.neighbors(index)
            .filter(|&neighbor| cell::is_mine_raw(self.load(neighbor)))
            .count() as u8
    }
}

pub struct NeighborIter<'g> {
    grid: &'g SharedGrid,
    center: (usize, usize),
    at: usize,
}

impl Iterator for NeighborIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.at < DISPLACEMENTS.len() {
            let (dx, dy) = DISPLACEMENTS[self.at];
            self.at += 1;

            let Some(column) = self.center.0.checked_add_signed(dx) else {
                continue;
            };
            let Some(row) = self.center.1.checked_add_signed(dy) else {
                continue;
            };
            if let Some(index) = self.grid.index(column, row) {
                return Some(index);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize, mines: usize) -> SharedGrid {
        SharedGrid::new(GameConfig::new(width, height, mines).unwrap())
    }

    #[test]
    fn initial_fill_packs_mines_first_and_marks_the_rest_uncomputed() {
        let grid = grid(4, 3, 5);
        for index in 0..5 {
            assert_eq!(grid.load(index), MINE);
        }
        for index in 5..12 {
            assert_eq!(grid.load(index), UNCOMPUTED);
        }
    }

    #[test]
    fn index_mapping_is_a_bijection_with_height_as_the_stride() {
        let grid = grid(3, 2, 1);
        let mut seen = vec![false; grid.size()];
        for column in 0..3 {
            for row in 0..2 {
                let index = grid.index(column, row).unwrap();
                assert!(!seen[index]);
                seen[index] = true;
                assert_eq!(grid.coords(index), (column, row));
            }
        }
        assert!(seen.into_iter().all(|hit| hit));
    }

    #[test]
    fn out_of_bounds_coordinates_are_a_normal_none_signal() {
        let grid = grid(3, 2, 1);
        assert_eq!(grid.index(3, 0), None);
        assert_eq!(grid.index(0, 2), None);
        assert_eq!(grid.index(usize::MAX, usize::MAX), None);
    }

    #[test]
    fn neighbor_iteration_respects_the_edges() {
        let grid = grid(3, 3, 1);
        let corner = grid.index(0, 0).unwrap();
        assert_eq!(grid.neighbors(corner).count(), 3);

        let edge = grid.index(1, 0).unwrap();
        assert_eq!(grid.neighbors(edge).count(), 5);

        let center = grid.index(1, 1).unwrap();
        assert_eq!(grid.neighbors(center).count(), 8);
    }

    #[test]
    fn adjacent_mine_count_sees_mines_in_every_band() {
        let grid = SharedGrid::from_mine_indices(3, 3, &[0]).unwrap();
        let center = grid.index(1, 1).unwrap();
        assert_eq!(grid.adjacent_mine_count(center), 1);

        // flagged mine still counts
        grid.store(0, MINE + 20);
        assert_eq!(grid.adjacent_mine_count(center), 1);
    }

    #[test]
    fn forced_mine_placement_validates_indices() {
        let result = SharedGrid::from_mine_indices(2, 2, &[4]);
        assert_eq!(result.err(), Some(GridError::InvalidCoords));
    }

    #[test]
    fn duplicate_forced_mines_collapse() {
        let grid = SharedGrid::from_mine_indices(2, 2, &[1, 1]).unwrap();
        assert_eq!(grid.mine_count(), 1);
    }

    #[test]
    fn compare_exchange_only_succeeds_on_the_expected_value() {
        let grid = grid(2, 2, 1);
        assert_eq!(grid.compare_exchange(0, MINE, 0), Ok(MINE));
        assert_eq!(grid.compare_exchange(0, MINE, 1), Err(0));
    }
}
