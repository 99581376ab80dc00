//! GATT identifiers and notification payload framing.

use crate::domain::models::Value;
use std::collections::HashMap;
use tracing::warn;
use uuid::{uuid, Uuid};

/// Primary service under which all channel characteristics live.
pub const SERVICE_UUID: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");

/// Client Characteristic Configuration Descriptor, the standard knob a
/// central writes to opt in or out of notifications.
pub const CCCD_UUID: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// CCCD value enabling notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCCD value disabling notifications
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Fixed channel-path to characteristic assignments.
///
/// Remotes hard-code these, so the table never changes at runtime.
const CHANNEL_UUIDS: &[(&str, Uuid)] = &[
    ("/sensors/accelerometer", uuid!("0000ffe1-0000-1000-8000-00805f9b34fb")),
    ("/sensors/gyroscope", uuid!("0000ffe2-0000-1000-8000-00805f9b34fb")),
    ("/sensors/magnetometer", uuid!("0000ffe3-0000-1000-8000-00805f9b34fb")),
    ("/sensors/light", uuid!("0000ffe4-0000-1000-8000-00805f9b34fb")),
    ("/sensors/proximity", uuid!("0000ffe5-0000-1000-8000-00805f9b34fb")),
    ("/sensors/pressure", uuid!("0000ffe6-0000-1000-8000-00805f9b34fb")),
    ("/sensors/temperature", uuid!("0000ffe7-0000-1000-8000-00805f9b34fb")),
    ("/sensors/humidity", uuid!("0000ffe8-0000-1000-8000-00805f9b34fb")),
    ("/note_on", uuid!("0000ffe9-0000-1000-8000-00805f9b34fb")),
    ("/note_off", uuid!("0000ffea-0000-1000-8000-00805f9b34fb")),
    ("/pitch_bend", uuid!("0000ffeb-0000-1000-8000-00805f9b34fb")),
    ("/cc/1", uuid!("0000ffec-0000-1000-8000-00805f9b34fb")),
];

/// Bidirectional path ↔ characteristic map, built once per engine session
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct GattChannelMap {
    by_path: HashMap<String, Uuid>,
    by_uuid: HashMap<Uuid, String>,
}

impl GattChannelMap {
    /// Build the map for the given channel paths. Paths without a fixed
    /// assignment are skipped with a warning; they stay OSC-only.
    pub fn for_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut by_path = HashMap::new();
        let mut by_uuid = HashMap::new();
        for path in paths {
            match CHANNEL_UUIDS.iter().find(|(p, _)| *p == path) {
                Some((p, uuid)) => {
                    by_path.insert((*p).to_string(), *uuid);
                    by_uuid.insert(*uuid, (*p).to_string());
                }
                None => warn!("No characteristic assignment for channel {}", path),
            }
        }
        Self { by_path, by_uuid }
    }

    pub fn uuid_for(&self, path: &str) -> Option<Uuid> {
        self.by_path.get(path).copied()
    }

    pub fn path_for(&self, uuid: &Uuid) -> Option<&str> {
        self.by_uuid.get(uuid).map(String::as_str)
    }

    pub fn uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.by_path.values().copied()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// What the engine asks the platform stack to install.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDefinition>,
}

#[derive(Debug, Clone)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub readable: bool,
    pub notifiable: bool,
    pub descriptors: Vec<Uuid>,
}

impl CharacteristicDefinition {
    /// The shape every channel characteristic takes: readable, notifiable,
    /// with a client configuration descriptor.
    pub fn read_notify(uuid: Uuid) -> Self {
        Self {
            uuid,
            readable: true,
            notifiable: true,
            descriptors: vec![CCCD_UUID],
        }
    }
}

/// Advertising parameters: connectable, no timeout, tuned for latency over
/// battery.
#[derive(Debug, Clone)]
pub struct AdvertiseConfig {
    pub service_uuid: Uuid,
    pub device_name: String,
    pub include_device_name: bool,
    pub connectable: bool,
    /// 0 means advertise until stopped
    pub timeout_ms: u32,
    pub tx_power: TxPower,
    pub mode: AdvertiseMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowLatency,
    Balanced,
    LowPower,
}

/// Pack values for one notification: tightly packed little-endian f32, ints
/// converted, no header. The characteristic already tells the remote which
/// channel (and therefore which arity) it is looking at, so self-describing
/// framing would be wasted bytes.
pub fn pack_notify_payload(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.as_f32().to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_is_bidirectional() {
        let map = GattChannelMap::for_paths(["/sensors/accelerometer", "/note_on"]);
        assert_eq!(map.len(), 2);

        let accel = map.uuid_for("/sensors/accelerometer").unwrap();
        assert_eq!(map.path_for(&accel), Some("/sensors/accelerometer"));
        assert_eq!(accel, uuid!("0000ffe1-0000-1000-8000-00805f9b34fb"));
    }

    #[test]
    fn test_unassigned_paths_are_skipped() {
        let map = GattChannelMap::for_paths(["/sensors/light", "/custom/thing"]);
        assert_eq!(map.len(), 1);
        assert!(map.uuid_for("/custom/thing").is_none());
    }

    #[test]
    fn test_payload_is_little_endian_f32() {
        let payload = pack_notify_payload(&[Value::Float(1.0), Value::Int(2)]);
        assert_eq!(payload.len(), 8);
        assert_eq!(&payload[..4], &[0x00, 0x00, 0x80, 0x3F]); // 1.0f32 LE
        assert_eq!(&payload[4..], &[0x00, 0x00, 0x00, 0x40]); // 2.0f32 LE
    }

    #[test]
    fn test_empty_payload() {
        assert!(pack_notify_payload(&[]).is_empty());
    }
}
