//! Channel table and per-channel runtime state.

/// How raw readings map onto the canonical [0, 1] range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Straight-line mapping between a fixed (min, max) pair
    Linear { min: f32, max: f32 },
    /// Decade-based curve for light intensity, where the useful signal
    /// spans 0 lux to well past 10000 lux
    Log10,
}

/// Change-detection threshold applied when no override is configured
pub const DEFAULT_THRESHOLD: f32 = 0.05;

/// Static configuration for one telemetry channel.
///
/// Arity is fixed per channel for the process lifetime; only `enabled` and
/// `threshold` are user-tunable.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub path: String,
    pub arity: usize,
    pub enabled: bool,
    pub threshold: f32,
    pub scale: Scale,
}

impl ChannelConfig {
    fn new(path: &str, arity: usize, scale: Scale) -> Self {
        Self {
            path: path.to_string(),
            arity,
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            scale,
        }
    }
}

/// The channels this bridge serves, with their arities and normalization
/// ranges. Sensor ranges follow typical mobile hardware envelopes; the
/// control channels use MIDI value ranges.
pub fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig::new("/sensors/accelerometer", 3, Scale::Linear { min: -10.0, max: 10.0 }),
        ChannelConfig::new("/sensors/gyroscope", 3, Scale::Linear { min: -10.0, max: 10.0 }),
        ChannelConfig::new("/sensors/magnetometer", 3, Scale::Linear { min: -100.0, max: 100.0 }),
        ChannelConfig::new("/sensors/light", 1, Scale::Log10),
        ChannelConfig::new("/sensors/proximity", 1, Scale::Linear { min: 0.0, max: 10.0 }),
        ChannelConfig::new("/sensors/pressure", 1, Scale::Linear { min: 300.0, max: 1100.0 }),
        ChannelConfig::new("/sensors/temperature", 1, Scale::Linear { min: -40.0, max: 85.0 }),
        ChannelConfig::new("/sensors/humidity", 1, Scale::Linear { min: 0.0, max: 100.0 }),
        ChannelConfig::new("/note_on", 2, Scale::Linear { min: 0.0, max: 127.0 }),
        ChannelConfig::new("/note_off", 2, Scale::Linear { min: 0.0, max: 127.0 }),
        ChannelConfig::new("/pitch_bend", 1, Scale::Linear { min: 0.0, max: 16383.0 }),
        ChannelConfig::new("/cc/1", 1, Scale::Linear { min: 0.0, max: 127.0 }),
    ]
}

/// Mutable per-channel pipeline state.
///
/// `last_sent` holds the raw values of the last reading actually
/// transmitted, never of readings that were merely sampled. It starts as an
/// arity-matched zero vector, so the very first reading is compared against
/// zero.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub last_sent: Vec<f32>,
}

impl ChannelState {
    pub fn new(arity: usize) -> Self {
        Self {
            last_sent: vec![0.0; arity],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_arities() {
        let channels = default_channels();
        assert_eq!(channels.len(), 12);

        let arity = |path: &str| {
            channels
                .iter()
                .find(|c| c.path == path)
                .map(|c| c.arity)
                .unwrap()
        };
        assert_eq!(arity("/sensors/accelerometer"), 3);
        assert_eq!(arity("/sensors/gyroscope"), 3);
        assert_eq!(arity("/sensors/magnetometer"), 3);
        assert_eq!(arity("/sensors/light"), 1);
        assert_eq!(arity("/note_on"), 2);
        assert_eq!(arity("/pitch_bend"), 1);
    }

    #[test]
    fn test_defaults_enabled_with_threshold() {
        for channel in default_channels() {
            assert!(channel.enabled);
            assert_eq!(channel.threshold, DEFAULT_THRESHOLD);
        }
    }

    #[test]
    fn test_light_is_logarithmic() {
        let light = default_channels()
            .into_iter()
            .find(|c| c.path == "/sensors/light")
            .unwrap();
        assert_eq!(light.scale, Scale::Log10);
    }

    #[test]
    fn test_state_starts_zeroed() {
        let state = ChannelState::new(3);
        assert_eq!(state.last_sent, vec![0.0, 0.0, 0.0]);
    }
}
