//! BLE Peripheral Module
//!
//! Serves channel readings as a local GATT peripheral: one read+notify
//! characteristic per channel under a single primary service, advertised
//! with the device name.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  BlePeripheralClient                     │
//! │   (transport adapter - owns the engine and event pump)   │
//! └───────────────┬────────────────────────┬────────────────┘
//!                 │ commands               │ events
//!                 ▼                        │
//!         ┌──────────────┐        ┌────────┴───────┐
//!         │   GattHost   │        │   GattEvent    │
//!         │              │        │                │
//!         │ - server     │        │ - service up   │
//!         │ - advertise  │        │ - (dis)connect │
//!         │ - notify     │        │ - read/write   │
//!         └──────────────┘        └────────────────┘
//! ```
//!
//! The platform BLE stack sits entirely behind [`engine::GattHost`]
//! (commands) and [`engine::GattEvent`] (callbacks turned into a stream),
//! so the whole lifecycle runs in tests without a radio.
//!
//! ## Modules
//!
//! - [`gatt`] - service/characteristic identifiers and notify payloads
//! - [`engine`] - peripheral state machine and subscriber tracking

pub mod engine;
pub mod gatt;

// Re-export the transport-facing surface for convenience
pub use engine::{BleConfig, BlePeripheralClient, BlePeripheralEngine, GattEvent, GattHost};
