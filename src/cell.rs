use serde::{Deserialize, Serialize};

use crate::{GridError, Result};

/// Adjacency code marking a cell that carries a mine.
pub const MINE: i8 = 9;
/// Hidden cell whose neighbor count has not been computed yet.
pub const UNCOMPUTED: i8 = -1;

pub(crate) const REVEALED_OFFSET: i8 = 10;
pub(crate) const FLAGGED_OFFSET: i8 = 20;

/// Band a cell value belongs to. The raw encoding is `band offset + adjacency
/// code`, so band membership is a plain integer range test.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Hidden,
    Revealed,
    Flagged,
}

/// Validated band-encoded cell value.
///
/// The legal domain is `-1` (hidden, uncomputed) and `0..=29`: `0..=9` hidden,
/// `10..=19` revealed, `20..=29` flagged, with `code % 10 == 9` meaning mine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct Cell(i8);

impl Cell {
    pub const fn from_raw(value: i8) -> Result<Self> {
        match value {
            UNCOMPUTED | 0..=29 => Ok(Self(value)),
            _ => Err(GridError::InvalidCellValue { value }),
        }
    }

    pub const fn raw(self) -> i8 {
        self.0
    }

    pub const fn band(self) -> Band {
        if self.0 < REVEALED_OFFSET {
            Band::Hidden
        } else if self.0 < FLAGGED_OFFSET {
            Band::Revealed
        } else {
            Band::Flagged
        }
    }

    pub const fn is_hidden(self) -> bool {
        self.0 < REVEALED_OFFSET
    }

    pub const fn is_revealed(self) -> bool {
        self.0 >= REVEALED_OFFSET && self.0 < FLAGGED_OFFSET
    }

    pub const fn is_flagged(self) -> bool {
        self.0 >= FLAGGED_OFFSET
    }

    pub const fn is_mine(self) -> bool {
        is_mine_raw(self.0)
    }

    pub const fn is_uncomputed(self) -> bool {
        self.0 == UNCOMPUTED
    }

    /// Mine-neighbor count of the cell, `None` for mines and uncomputed cells.
    pub const fn adjacency(self) -> Option<u8> {
        if self.is_uncomputed() || self.is_mine() {
            None
        } else {
            Some((self.0 % 10) as u8)
        }
    }

    pub const fn to_revealed(self) -> Cell {
        debug_assert!(self.is_hidden() && !self.is_uncomputed());
        Cell(self.0 + REVEALED_OFFSET)
    }

    pub const fn to_flagged(self) -> Cell {
        debug_assert!(self.is_hidden() && !self.is_uncomputed());
        Cell(self.0 + FLAGGED_OFFSET)
    }

    pub const fn to_unflagged(self) -> Cell {
        debug_assert!(self.is_flagged());
        Cell(self.0 - FLAGGED_OFFSET)
    }
}

impl TryFrom<i8> for Cell {
    type Error = GridError;

    fn try_from(value: i8) -> Result<Self> {
        Self::from_raw(value)
    }
}

impl From<Cell> for i8 {
    fn from(cell: Cell) -> i8 {
        cell.raw()
    }
}

/// Mine test over a raw value, for hot paths that already hold a trusted byte.
pub(crate) const fn is_mine_raw(value: i8) -> bool {
    value % 10 == MINE
}

pub(crate) const fn is_flagged_raw(value: i8) -> bool {
    value >= FLAGGED_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_accepts_the_three_bands_and_the_uncomputed_sentinel() {
        for value in [-1, 0, 5, 9, 10, 18, 19, 20, 27, 29] {
            assert_eq!(Cell::from_raw(value).unwrap().raw(), value);
        }
    }

    #[test]
    fn from_raw_rejects_out_of_domain_values() {
        for value in [-2, -10, 30, 42, i8::MAX, i8::MIN] {
            assert_eq!(
                Cell::from_raw(value),
                Err(GridError::InvalidCellValue { value })
            );
        }
    }

    #[test]
    fn band_membership_is_a_range_test() {
        assert_eq!(Cell::from_raw(-1).unwrap().band(), Band::Hidden);
        assert_eq!(Cell::from_raw(9).unwrap().band(), Band::Hidden);
        assert_eq!(Cell::from_raw(10).unwrap().band(), Band::Revealed);
        assert_eq!(Cell::from_raw(19).unwrap().band(), Band::Revealed);
        assert_eq!(Cell::from_raw(20).unwrap().band(), Band::Flagged);
        assert_eq!(Cell::from_raw(29).unwrap().band(), Band::Flagged);
    }

    #[test]
    fn mine_sentinel_is_detected_in_every_band() {
        for value in [9, 19, 29] {
            assert!(Cell::from_raw(value).unwrap().is_mine());
        }
        for value in [-1, 0, 8, 10, 18, 20, 28] {
            assert!(!Cell::from_raw(value).unwrap().is_mine());
        }
    }

    #[test]
    fn adjacency_decodes_the_count_and_hides_sentinels() {
        assert_eq!(Cell::from_raw(3).unwrap().adjacency(), Some(3));
        assert_eq!(Cell::from_raw(13).unwrap().adjacency(), Some(3));
        assert_eq!(Cell::from_raw(23).unwrap().adjacency(), Some(3));
        assert_eq!(Cell::from_raw(9).unwrap().adjacency(), None);
        assert_eq!(Cell::from_raw(-1).unwrap().adjacency(), None);
    }

    #[test]
    fn band_transitions_shift_by_the_band_offset() {
        let hidden = Cell::from_raw(2).unwrap();
        assert_eq!(hidden.to_revealed().raw(), 12);
        assert_eq!(hidden.to_flagged().raw(), 22);
        assert_eq!(hidden.to_flagged().to_unflagged(), hidden);
    }
}
