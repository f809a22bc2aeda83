//! Sequential mix composition with an interstitial sound between clips.

use thiserror::Error;

use super::SampleBuffer;

/// Errors from composing a mix buffer.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Cannot compose a mix from an empty clip list")]
    Empty,
    #[error("Input sample rate {found} does not match the render rate {expected}")]
    SampleRateMismatch { expected: u32, found: u32 },
}

/// Concatenate rendered clips into one composite buffer, inserting the
/// interstitial sound between (never after) consecutive clips.
///
/// The output channel count is the maximum over every input; narrower inputs
/// fill the extra channels by duplicating their channel 0. All inputs must
/// already share one sample rate; the offline renderer guarantees that for
/// anything it produced.
pub fn compose(
    clips: &[SampleBuffer],
    interstitial: Option<&SampleBuffer>,
) -> Result<SampleBuffer, ComposeError> {
    let first = clips.first().ok_or(ComposeError::Empty)?;
    let sample_rate = first.sample_rate();
    for input in clips.iter().chain(interstitial) {
        if input.sample_rate() != sample_rate {
            return Err(ComposeError::SampleRateMismatch {
                expected: sample_rate,
                found: input.sample_rate(),
            });
        }
    }

    let channel_count = clips
        .iter()
        .chain(interstitial)
        .map(SampleBuffer::channel_count)
        .max()
        .unwrap_or(1)
        .max(1);
    let gap_frames = interstitial.map(SampleBuffer::frames).unwrap_or(0);
    let total_frames: usize = clips.iter().map(SampleBuffer::frames).sum::<usize>()
        + gap_frames * clips.len().saturating_sub(1);

    let mut channels = vec![Vec::with_capacity(total_frames); channel_count];
    for (idx, clip) in clips.iter().enumerate() {
        if idx > 0 {
            if let Some(gap) = interstitial {
                append(&mut channels, gap);
            }
        }
        append(&mut channels, clip);
    }
    Ok(SampleBuffer::from_planar(channels, sample_rate))
}

fn append(channels: &mut [Vec<f32>], input: &SampleBuffer) {
    for (index, channel) in channels.iter_mut().enumerate() {
        channel.extend_from_slice(input.channel_or_first(index));
    }
}
