// ============================================================================
// PIXEL ENGINES — tone/colour, convolution filters, geometric transforms
// ============================================================================
//
// Engines are pure functions `&Raster -> Raster`. The `*_canvas` entry points
// take the shared canvas, acquire its lock, and write the preview buffer.
// ============================================================================

pub mod adjustments;
pub mod color;
pub mod filters;
pub mod sliders;
pub mod transform;

use thiserror::Error;

/// Outcome of an engine run that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    /// Preview was rewritten.
    Done,
    /// Master or preview is unset; nothing was touched.
    NotAttached,
    /// The result was computed for parameters or a master that has since
    /// been superseded, and was dropped.
    Stale,
}

impl EngineStatus {
    /// Advisory status text for the UI.
    pub fn message(&self) -> &'static str {
        match self {
            EngineStatus::Done => "",
            EngineStatus::NotAttached => "No image loaded",
            EngineStatus::Stale => "",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("buffer invariant violated: {0}")]
    Invariant(String),

    #[error("engine panicked: {0}")]
    Panicked(String),
}
