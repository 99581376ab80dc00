//! Raw-range to [0, 1] value normalization.

use crate::domain::channel::Scale;

/// Map a raw reading into [0, 1] for the channel's scale.
///
/// Pure and deterministic: change detection and the transmitted values must
/// agree on the exact same mapping. Linear channels interpolate between the
/// fixed (min, max) pair and clamp. The logarithmic curve compresses decade
/// bands so 0-1 lux lands near 0 and 10000+ lux saturates at 1.
pub fn normalize(scale: Scale, value: f32) -> f32 {
    match scale {
        Scale::Linear { min, max } => ((value - min) / (max - min)).clamp(0.0, 1.0),
        Scale::Log10 => {
            if value <= 0.0 {
                0.0
            } else {
                ((value.max(1.0).log10() + 1.0) / 6.0).clamp(0.0, 1.0)
            }
        }
    }
}
