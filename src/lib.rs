//! Sensor telemetry bridge.
//!
//! Streams `(channel, values)` readings to a remote listener over one of two
//! transports: an OSC binary protocol on UDP, or a local BLE GATT peripheral
//! with one characteristic per channel. The embedding layer (UI, sensor
//! acquisition) produces samples and renders status; the throttling, change
//! detection, normalization, wire encoding and transport lifecycle all live
//! here.

pub mod domain;
pub mod infrastructure;
pub mod pipeline;

pub use domain::models::{ConnectionStatus, PipelineEvent, Sample, Value};
pub use pipeline::{Session, SessionConfig};
