use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("Too many mines for the requested grid size")]
    TooManyMines,
    #[error("Cell value {value} is outside the encodable domain")]
    InvalidCellValue { value: i8 },
    #[error("Invalid coordinates")]
    InvalidCoords,
}

pub type Result<T> = core::result::Result<T, GridError>;
