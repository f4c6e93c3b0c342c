use serde::{Deserialize, Serialize};

pub use cell::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use grid::*;

mod cell;
mod engine;
mod error;
mod events;
mod generator;
mod grid;

/// Worker threads used for generation when the embedder has no preference.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Board dimensions and mine count for one session.
///
/// Deserialization routes through [`GameConfig::new`], so an overfull board
/// cannot enter the system through serde either.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedGameConfig")]
pub struct GameConfig {
    width: usize,
    height: usize,
    mines: usize,
}

#[derive(Deserialize)]
struct UncheckedGameConfig {
    width: usize,
    height: usize,
    mines: usize,
}

impl TryFrom<UncheckedGameConfig> for GameConfig {
    type Error = GridError;

    fn try_from(raw: UncheckedGameConfig) -> Result<Self> {
        Self::new(raw.width, raw.height, raw.mines)
    }
}

impl GameConfig {
    pub fn new(width: usize, height: usize, mines: usize) -> Result<Self> {
        if mines >= width.saturating_mul(height) {
            return Err(GridError::TooManyMines);
        }
        Ok(Self {
            width,
            height,
            mines,
        })
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn mines(&self) -> usize {
        self.mines
    }

    pub const fn size(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    pub const fn safe_cells(&self) -> usize {
        self.size() - self.mines
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            mines: 25,
        }
    }
}
