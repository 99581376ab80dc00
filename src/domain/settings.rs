use crate::domain::channel::{default_channels, ChannelConfig, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "osc_sensor_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Per-channel overrides kept in the settings file. Arity and scale are
/// intrinsic to the channel and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_target_host")]
    pub target_host: String,
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    #[serde(default = "default_false")]
    pub normalize_enabled: bool,

    /// Keyed by channel path; channels without an entry use their defaults
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSettings>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // BLE Peripheral Settings
    #[serde(default = "default_device_name")]
    pub ble_device_name: String,
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_host: default_target_host(),
            target_port: default_target_port(),
            sampling_interval_ms: default_sampling_interval_ms(),
            normalize_enabled: default_false(),
            channels: BTreeMap::new(),
            log_settings: LogSettings::default(),
            ble_device_name: default_device_name(),
            ble_service_uuid: default_service_uuid(),
        }
    }
}

fn default_target_host() -> String {
    "192.168.0.5".to_string()
}
fn default_target_port() -> u16 {
    9000
}
fn default_sampling_interval_ms() -> u64 {
    200
}
fn default_device_name() -> String {
    "OSC Sensor Bridge".to_string()
}
fn default_service_uuid() -> String {
    "0000ffe0-0000-1000-8000-00805f9b34fb".to_string()
}

impl Settings {
    /// Channel table with the user's enabled/threshold overrides applied.
    pub fn channel_table(&self) -> Vec<ChannelConfig> {
        let mut table = default_channels();
        for channel in &mut table {
            if let Some(overrides) = self.channels.get(&channel.path) {
                channel.enabled = overrides.enabled;
                channel.threshold = overrides.threshold;
            }
        }
        table
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("OscSensorBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_channel_enabled(&mut self, path: &str, enabled: bool) -> anyhow::Result<()> {
        self.settings
            .channels
            .entry(path.to_string())
            .or_default()
            .enabled = enabled;
        self.save()
    }

    pub fn set_channel_threshold(&mut self, path: &str, threshold: f32) -> anyhow::Result<()> {
        self.settings
            .channels
            .entry(path.to_string())
            .or_default()
            .threshold = threshold;
        self.save()
    }
}
