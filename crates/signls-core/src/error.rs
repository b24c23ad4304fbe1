//! Error types for signls

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignlsError {
    #[error("Position ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("Cell ({0}, {1}) is already occupied")]
    Occupied(usize, usize),
    #[error("Cell ({0}, {1}) is empty")]
    Empty(usize, usize),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Invalid grid size: {0}x{1}")]
    InvalidSize(usize, usize),
}

pub type Result<T> = std::result::Result<T, SignlsError>;
