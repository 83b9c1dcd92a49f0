//! Error types for the simulation core
//!
//! Most failures here are programmer or content errors: a degenerate vector
//! handed to a ball, a size class out of range, a malformed level layout.

/// Simulation errors
#[derive(thiserror::Error, Debug)]
pub enum SimError {
    /// A direction with zero (or non-finite) length
    #[error("direction vector ({x}, {y}) cannot be normalized")]
    DegenerateDirection { x: f32, y: f32 },

    /// Scale factors must be finite and strictly positive
    #[error("invalid scale factor: {0}")]
    InvalidScaleFactor(f32),

    /// Size class index outside the known classes
    #[error("invalid size class: {0}")]
    InvalidSizeClass(u8),

    /// Speed value that does not name a speed class
    #[error("invalid speed class: {0}")]
    InvalidSpeedClass(u32),

    /// Level layout with no rows
    #[error("level layout is empty")]
    LayoutEmpty,

    /// Level layout rows of different widths
    #[error("level layout row {row} has width {found}, expected {expected}")]
    LayoutRagged {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Unrecognised character in a level layout
    #[error("unknown piece symbol '{symbol}' at row {row}, column {col}")]
    UnknownPieceSymbol { symbol: char, row: usize, col: usize },

    /// Portals come in pairs
    #[error("level has an odd number of portal pieces ({0})")]
    UnpairedPortal(usize),

    /// Tuning JSON could not be parsed
    #[error("tuning parse error: {0}")]
    TuningParse(#[from] serde_json::Error),

    /// Tuning file could not be read
    #[error("tuning IO error: {0}")]
    TuningIo(#[from] std::io::Error),
}
