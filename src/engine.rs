use std::collections::VecDeque;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cell::{self, Cell, FLAGGED_OFFSET, MINE, REVEALED_OFFSET};
use crate::events::{EngineEvent, ObserverId, Observers};
use crate::generator;
use crate::grid::SharedGrid;
use crate::{GameConfig, GridError, Result};

/// Session state machine. Actions are only accepted in `InGame`; `Refreshing`
/// is a transient sub-state covering an in-progress chain reveal or
/// first-click repair, and is left automatically.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Pending,
    Loading,
    InGame,
    Refreshing,
    Won,
    Lost,
}

impl GameState {
    pub const fn accepts_actions(self) -> bool {
        matches!(self, Self::InGame)
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome of a reveal action.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RevealOutcome {
    NoChange,
    Revealed { cell: Cell, opened: usize },
    HitMine,
    Won { cell: Cell, opened: usize },
}

impl RevealOutcome {
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Outcome of a flag toggle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MarkOutcome {
    NoChange,
    Flagged(Cell),
    Unflagged(Cell),
}

impl MarkOutcome {
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

/// Orchestrator that owns the shared grid buffer and drives the worker pool.
///
/// One engine is one game session: allocate, generate, play, destroy. The
/// buffer is only ever touched through atomic accessors, both by the worker
/// threads during generation and by the engine afterwards.
pub struct GridEngine {
    grid: SharedGrid,
    worker_count: usize,
    state: GameState,
    first_action: bool,
    safe_cell: Option<usize>,
    cells_left: usize,
    flags_left: usize,
    observers: Observers,
    destroyed: bool,
}

impl GridEngine {
    pub fn new(config: GameConfig, worker_count: usize) -> Self {
        Self {
            grid: SharedGrid::new(config),
            worker_count: worker_count.max(1),
            state: GameState::Pending,
            first_action: true,
            safe_cell: None,
            cells_left: config.safe_cells(),
            flags_left: config.mines(),
            observers: Observers::default(),
            destroyed: false,
        }
    }

    /// Builds a session with mines forced at the given linear indices. The
    /// neighbor-count pass runs as usual and the session starts accepting
    /// actions immediately.
    pub fn from_mine_indices(
        width: usize,
        height: usize,
        mine_indices: &[usize],
        worker_count: usize,
    ) -> Result<Self> {
        let grid = SharedGrid::from_mine_indices(width, height, mine_indices)?;
        let worker_count = worker_count.max(1);
        generator::compute_neighbor_counts(&grid, worker_count);
        let safe_cell = (0..grid.size()).find(|&index| !cell::is_mine_raw(grid.load(index)));

        Ok(Self {
            worker_count,
            state: GameState::InGame,
            first_action: true,
            safe_cell,
            cells_left: grid.safe_cell_count(),
            flags_left: grid.mine_count(),
            observers: Observers::default(),
            destroyed: false,
            grid,
        })
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn total_mines(&self) -> usize {
        self.grid.mine_count()
    }

    pub fn cells_remaining(&self) -> usize {
        self.cells_left
    }

    pub fn flags_remaining(&self) -> usize {
        self.flags_left
    }

    pub fn cell_at(&self, column: usize, row: usize) -> Result<Cell> {
        let index = self
            .grid
            .index(column, row)
            .ok_or(GridError::InvalidCoords)?;
        self.grid.cell(index)
    }

    pub fn subscribe(&mut self, observer: impl Fn(&EngineEvent) + Send + 'static) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Runs the generation and neighbor-count phases with a random seed.
    pub fn generate(&mut self) {
        self.generate_from_seed(rand::rng().random());
    }

    /// Runs the generation and neighbor-count phases. Both are barriers: the
    /// engine does not enter `InGame` (and so accepts no actions) until every
    /// worker has joined.
    pub fn generate_from_seed(&mut self, seed: u64) {
        if self.destroyed || self.state != GameState::Pending {
            log::warn!("generate called in {:?} state, ignoring", self.state);
            return;
        }
        self.set_state(GameState::Loading);

        let candidates = generator::shuffle_mines(&self.grid, self.worker_count, seed);
        generator::compute_neighbor_counts(&self.grid, self.worker_count);

        self.safe_cell = if candidates.is_empty() {
            // every worker raced out of its candidate; fall back to a scan
            (0..self.grid.size()).find(|&index| !cell::is_mine_raw(self.grid.load(index)))
        } else {
            let mut rng = SmallRng::seed_from_u64(seed);
            Some(candidates[rng.random_range(0..candidates.len())])
        };

        self.first_action = true;
        self.observers.emit(EngineEvent::FlagsRemaining(self.flags_left));
        self.set_state(GameState::InGame);
    }

    /// Reveals the cell at `(column, row)`.
    ///
    /// The first reveal of a session never hits a mine: if it would, the mine
    /// is relocated to the recorded safe cell and the surrounding counts are
    /// repaired locally before the reveal proceeds.
    pub fn reveal(&mut self, column: usize, row: usize) -> Result<RevealOutcome> {
        use RevealOutcome::*;

        if !self.state.accepts_actions() {
            return Ok(NoChange);
        }
        let Some(index) = self.grid.index(column, row) else {
            return Ok(NoChange);
        };

        let mut cell = self.grid.cell(index)?;
        if cell.is_revealed() || cell.is_flagged() {
            return Ok(NoChange);
        }

        if self.first_action && cell.is_mine() {
            if let Some(safe) = self.safe_cell.take() {
                self.set_state(GameState::Refreshing);
                self.relocate_first_mine(index, safe);
                cell = self.grid.cell(index)?;
            }
        }
        self.first_action = false;

        if cell.is_mine() {
            self.set_state(GameState::Lost);
            return Ok(HitMine);
        }

        match cell.adjacency() {
            Some(0) => {
                self.set_state(GameState::Refreshing);
                let started = Instant::now();
                let opened = self.flood_fill(index)?;
                log::debug!("chain reveal opened {opened} cells in {:?}", started.elapsed());

                self.cells_left = self.cells_left.saturating_sub(opened);
                self.observers.emit(EngineEvent::CellsRemaining(self.cells_left));

                let cell = self.grid.cell(index)?;
                if self.check_win() {
                    Ok(Won { cell, opened })
                } else {
                    self.set_state(GameState::InGame);
                    Ok(Revealed { cell, opened })
                }
            }
            Some(_) => {
                let revealed = cell.to_revealed();
                self.grid.store(index, revealed.raw());
                self.cells_left = self.cells_left.saturating_sub(1);
                self.observers.emit(EngineEvent::CellChanged {
                    index,
                    cell: revealed,
                });
                self.observers.emit(EngineEvent::CellsRemaining(self.cells_left));

                if self.state == GameState::Refreshing {
                    self.set_state(GameState::InGame);
                }
                if self.check_win() {
                    Ok(Won {
                        cell: revealed,
                        opened: 1,
                    })
                } else {
                    Ok(Revealed {
                        cell: revealed,
                        opened: 1,
                    })
                }
            }
            // an uncomputed cell after generation means the buffer is corrupt
            None => Err(GridError::InvalidCellValue { value: cell.raw() }),
        }
    }

    /// Toggles the flag on the cell at `(column, row)`, clamping the
    /// remaining-flags counter to `[0, total_mines]`.
    pub fn toggle_flag(&mut self, column: usize, row: usize) -> Result<MarkOutcome> {
        use MarkOutcome::*;

        if !self.state.accepts_actions() {
            return Ok(NoChange);
        }
        let Some(index) = self.grid.index(column, row) else {
            return Ok(NoChange);
        };

        let cell = self.grid.cell(index)?;
        if cell.is_revealed() {
            return Ok(NoChange);
        }

        if cell.is_flagged() {
            if self.flags_left >= self.grid.mine_count() {
                return Ok(NoChange);
            }
            let next = cell.to_unflagged();
            self.grid.store(index, next.raw());
            self.flags_left += 1;
            self.observers.emit(EngineEvent::CellChanged { index, cell: next });
            self.observers.emit(EngineEvent::FlagsRemaining(self.flags_left));
            Ok(Unflagged(next))
        } else {
            if self.flags_left == 0 {
                return Ok(NoChange);
            }
            let next = cell.to_flagged();
            self.grid.store(index, next.raw());
            self.flags_left -= 1;
            self.observers.emit(EngineEvent::CellChanged { index, cell: next });
            self.observers.emit(EngineEvent::FlagsRemaining(self.flags_left));
            Ok(Flagged(next))
        }
    }

    /// Tears the session down. Safe to call any number of times.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if self.flags_left != 0 {
            self.flags_left = 0;
            self.observers.emit(EngineEvent::FlagsRemaining(0));
        }
        self.set_state(GameState::Pending);
    }

    /// Moves the mine under the first click to the safe donor cell and
    /// repairs the adjacency counts of both neighborhoods locally.
    ///
    /// The target still decodes as a mine while the two delta passes run, so
    /// both skip it; its own count is recomputed last by direct inspection.
    fn relocate_first_mine(&mut self, target: usize, safe: usize) {
        let donor = self.grid.load(safe);
        let relocated = if cell::is_flagged_raw(donor) {
            MINE + FLAGGED_OFFSET
        } else {
            MINE
        };
        self.grid.store(safe, relocated);

        for neighbor in self.grid.neighbors(target) {
            let value = self.grid.load(neighbor);
            if !cell::is_mine_raw(value) {
                self.grid.store(neighbor, value - 1);
            }
        }
        for neighbor in self.grid.neighbors(safe) {
            let value = self.grid.load(neighbor);
            if !cell::is_mine_raw(value) {
                self.grid.store(neighbor, value + 1);
            }
        }

        let count = self.grid.adjacent_mine_count(target) as i8;
        self.grid.store(target, count);
        log::debug!("first-click mine relocated from {target} to {safe}");
    }

    /// Breadth-first chain reveal from `start`, using an explicit queue to
    /// bound stack depth on large fields. Returns the number of cells opened;
    /// the caller applies the remaining-cells update once for the whole batch.
    fn flood_fill(&self, start: usize) -> Result<usize> {
        let mut queue = VecDeque::from([start]);
        let mut opened = 0;

        while let Some(index) = queue.pop_front() {
            let value = self.grid.load(index);
            if value >= REVEALED_OFFSET {
                continue;
            }
            let revealed = Cell::from_raw(value)?.to_revealed();
            if self.grid.compare_exchange(index, value, revealed.raw()).is_err() {
                // lost a race on this cell; it contributes nothing this pass
                continue;
            }
            opened += 1;
            self.observers.emit(EngineEvent::CellChanged {
                index,
                cell: revealed,
            });

            if value != 0 {
                continue;
            }
            for neighbor in self.grid.neighbors(index) {
                if self.grid.load(neighbor) < REVEALED_OFFSET {
                    queue.push_back(neighbor);
                }
            }
        }

        log::trace!("flood fill from {start} opened {opened} cells");
        Ok(opened)
    }

    fn check_win(&mut self) -> bool {
        if self.cells_left != 0 || self.state.is_finished() {
            return false;
        }
        self.set_state(GameState::Won);
        if self.flags_left != 0 {
            self.flags_left = 0;
            self.observers.emit(EngineEvent::FlagsRemaining(0));
        }
        true
    }

    fn set_state(&mut self, state: GameState) {
        if self.state != state {
            self.state = state;
            self.observers.emit(EngineEvent::StateChanged(state));
        }
    }
}
