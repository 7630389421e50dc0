use serde::{Deserialize, Serialize};

/// Tuning knobs for the waveform visualization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Number of bars rendered by the presentation layer
    pub bar_count: usize,
    /// Height (in pixels) of a bar when the session is neither listening nor speaking
    pub rest_height: f32,
    /// Baseline height of an active bar before amplitude is applied
    pub base_height: f32,
    /// How strongly amplitude inflates an active bar
    pub amplitude_scale: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bar_count: 30,
            rest_height: 10.0,
            base_height: 20.0,
            amplitude_scale: 30.0,
        }
    }
}

/// Derive the bar heights for the waveform visualization.
///
/// Pure function of `(bar index, time, amplitude, is_active)`: each active bar
/// rides a traveling sine wave phased by its index and the elapsed time, scaled
/// by the current amplitude. Inactive sessions collapse every bar to the
/// resting height regardless of time or amplitude, so the visualization is
/// deterministic at rest.
///
/// Amplitude is clamped to `[0.0, 1.0]` on ingest; backends are not trusted to
/// stay in range.
pub fn bar_heights(
    config: &VisualizerConfig,
    time_ms: u64,
    amplitude: f32,
    is_active: bool,
) -> Vec<f32> {
    if !is_active {
        return vec![config.rest_height; config.bar_count];
    }

    let amplitude = amplitude.clamp(0.0, 1.0);
    let count = config.bar_count.max(1) as f32;

    (0..config.bar_count)
        .map(|i| {
            let phase = (i as f32 / count) * std::f32::consts::PI + time_ms as f32 / 200.0;
            config.base_height + (phase.sin() + 1.0) * amplitude * config.amplitude_scale
        })
        .collect()
}
