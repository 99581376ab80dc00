//! Decides whether a new reading is worth transmitting.

use crate::domain::channel::ChannelConfig;
use crate::domain::normalize::normalize;

/// True when `sample` differs enough from `last_sent` to transmit.
///
/// Non-normalized mode compares component-wise with exact float inequality.
/// Normalized mode maps both sides through the channel scale and requires
/// the largest per-component difference to strictly exceed the channel
/// threshold. No state is touched here; the caller commits `last_sent`
/// only when it actually sends.
pub fn should_send(
    channel: &ChannelConfig,
    sample: &[f32],
    last_sent: &[f32],
    normalized: bool,
) -> bool {
    debug_assert_eq!(sample.len(), last_sent.len());

    if !normalized {
        return sample.iter().zip(last_sent).any(|(a, b)| a != b);
    }

    let max_diff = sample
        .iter()
        .zip(last_sent)
        .map(|(a, b)| (normalize(channel.scale, *a) - normalize(channel.scale, *b)).abs())
        .fold(0.0f32, f32::max);

    max_diff > channel.threshold
}
