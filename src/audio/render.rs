//! Offline render stage, decoupled from any real-time playback path.
//!
//! Every buffer headed for a clip file or a composition passes through one
//! [`OfflineRenderer`], which pins the pipeline to a single context sample
//! rate. Buffers at a different source rate are linearly resampled on the
//! way in, so later stages can assume uniform rates.

use super::SampleBuffer;

/// Offline rendering context with a fixed output sample rate.
#[derive(Debug, Clone, Copy)]
pub struct OfflineRenderer {
    sample_rate: u32,
}

impl OfflineRenderer {
    /// Renderer at the given context rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }

    /// The context sample rate every rendered buffer comes out at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render a buffer to the context rate.
    pub fn render(&self, input: &SampleBuffer) -> SampleBuffer {
        if input.sample_rate() == self.sample_rate {
            return input.clone();
        }
        let channels = input
            .planar()
            .iter()
            .map(|channel| {
                let mut out = Vec::new();
                resample_linear_into(&mut out, channel, input.sample_rate(), self.sample_rate);
                out
            })
            .collect();
        SampleBuffer::from_planar(channels, self.sample_rate)
    }
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RENDER_SAMPLE_RATE)
    }
}

pub(crate) fn resample_linear_into(
    out: &mut Vec<f32>,
    samples: &[f32],
    input_rate: u32,
    output_rate: u32,
) {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        out.clear();
        out.extend_from_slice(samples);
        return;
    }
    let duration_seconds = samples.len() as f64 / f64::from(input_rate);
    let out_len = (duration_seconds * f64::from(output_rate)).round().max(1.0) as usize;
    out.clear();
    out.reserve(out_len);
    for i in 0..out_len {
        let pos = i as f64 / f64::from(output_rate) * f64::from(input_rate);
        out.push(lerp_sample(samples, pos));
    }
}

fn lerp_sample(samples: &[f32], pos: f64) -> f32 {
    let idx0 = pos.floor().max(0.0) as usize;
    let frac = (pos - idx0 as f64).clamp(0.0, 1.0) as f32;
    let idx1 = idx0.saturating_add(1).min(samples.len().saturating_sub(1));
    let a = samples.get(idx0).copied().unwrap_or(0.0);
    let b = samples.get(idx1).copied().unwrap_or(a);
    a + (b - a) * frac
}
