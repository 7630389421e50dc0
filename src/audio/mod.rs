//! Audio-side helpers for the voice session
//!
//! - `levels`: bar-height derivation for the waveform visualization
//! - `capture`: the process-wide exclusive claim on the audio capture device

pub(crate) mod capture;
mod levels;

pub use capture::CaptureClaim;
pub use levels::{bar_heights, VisualizerConfig};
