//! BLE peripheral state machine.
//!
//! The lifecycle is callback-driven on real hardware, so the engine is a
//! plain synchronous state machine fed by [`GattEvent`]s, with every command
//! to the platform stack going through [`GattHost`]. The one timed step,
//! the settle delay between service registration and advertise start, is
//! surfaced as an explicit [`FollowUp`] so the event pump (or a test) can
//! perform it.

use crate::domain::models::Value;
use crate::domain::settings::Settings;
use crate::infrastructure::ble::gatt::{
    self, AdvertiseConfig, AdvertiseMode, CharacteristicDefinition, GattChannelMap,
    ServiceDefinition, TxPower, CCCD_UUID, DISABLE_NOTIFICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use crate::infrastructure::transport::{TransportClient, TransportError};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Remote device identifier: the 48-bit address widened to a u64, the shape
/// platform adapters report.
pub type DeviceAddress = u64;

/// Delay between service registration and advertise start. Underlying
/// stacks race when advertising begins immediately after the service is
/// installed; this is a tunable workaround, not protocol semantics.
pub const ADVERTISE_SETTLE: Duration = Duration::from_millis(500);

/// Where the peripheral currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    ServerOpening,
    ServiceRegistering,
    Advertising,
    ServiceFailed,
    AdvertiseFailed,
}

/// Commands the engine issues to the platform BLE stack.
pub trait GattHost: Send + Sync {
    /// Open the local GATT server.
    fn open_server(&self) -> anyhow::Result<()>;

    /// Submit the primary service. The outcome arrives later as a
    /// [`GattEvent::ServiceAdded`].
    fn add_service(&self, service: &ServiceDefinition) -> anyhow::Result<()>;

    /// Begin advertising. The outcome arrives as `AdvertiseStarted` or
    /// `AdvertiseFailed`.
    fn start_advertising(&self, config: &AdvertiseConfig);

    fn stop_advertising(&self);

    /// Push one characteristic change to one subscribed central.
    fn notify(&self, device: DeviceAddress, characteristic: Uuid, value: &[u8])
        -> anyhow::Result<()>;

    /// Answer a read or write request from a central.
    fn send_response(&self, device: DeviceAddress, request_id: u32, value: &[u8]);

    /// Tear the server down.
    fn close_server(&self);
}

/// Callbacks from the platform BLE stack, delivered as a stream.
#[derive(Debug, Clone)]
pub enum GattEvent {
    /// The server confirmed (status 0) or refused the service registration
    ServiceAdded { status: i32 },
    AdvertiseStarted,
    AdvertiseFailed { code: i32 },
    CentralConnected { device: DeviceAddress },
    CentralDisconnected { device: DeviceAddress },
    /// A central read a characteristic value
    ReadRequest {
        device: DeviceAddress,
        request_id: u32,
        characteristic: Uuid,
    },
    /// A central wrote a characteristic descriptor (typically the CCCD)
    DescriptorWrite {
        device: DeviceAddress,
        request_id: u32,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
        response_needed: bool,
    },
}

/// Deferred work the event pump performs on the engine's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Wait out the delay, then call
    /// [`BlePeripheralEngine::begin_advertising`]
    StartAdvertisingAfter(Duration),
}

/// Peripheral identity, snapshotted per session.
#[derive(Debug, Clone)]
pub struct BleConfig {
    pub device_name: String,
    pub service_uuid: Uuid,
}

impl BleConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let service_uuid = Uuid::parse_str(&settings.ble_service_uuid).with_context(|| {
            format!("invalid BLE service UUID '{}'", settings.ble_service_uuid)
        })?;
        Ok(Self {
            device_name: settings.ble_device_name.clone(),
            service_uuid,
        })
    }
}

/// Peripheral-role engine: owns the characteristic table, the subscriber
/// set and the lifecycle state. Subscription is tracked per connection, not
/// per characteristic: one notification-enable write subscribes the central
/// to every channel, and only a disconnect removes it.
pub struct BlePeripheralEngine {
    host: Arc<dyn GattHost>,
    config: BleConfig,
    map: GattChannelMap,
    state: EngineState,
    subscribers: HashSet<DeviceAddress>,
    /// Last value written to each characteristic, served to read requests
    values: HashMap<Uuid, Vec<u8>>,
}

impl BlePeripheralEngine {
    pub fn new<'a>(
        host: Arc<dyn GattHost>,
        config: BleConfig,
        channel_paths: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            host,
            config,
            map: GattChannelMap::for_paths(channel_paths),
            state: EngineState::Idle,
            subscribers: HashSet::new(),
            values: HashMap::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Open the server and submit the service. Advancing past
    /// `ServiceRegistering` is driven by stack events.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.state != EngineState::Idle {
            return Err(TransportError::AlreadyConnected);
        }

        self.host.open_server().map_err(TransportError::Ble)?;
        self.state = EngineState::ServerOpening;

        let service = ServiceDefinition {
            uuid: self.config.service_uuid,
            characteristics: self
                .map
                .uuids()
                .map(CharacteristicDefinition::read_notify)
                .collect(),
        };
        info!(
            "Registering GATT service with {} characteristics",
            service.characteristics.len()
        );
        self.host.add_service(&service).map_err(TransportError::Ble)?;
        Ok(())
    }

    /// Feed one stack event through the machine. Returns the follow-up the
    /// caller must perform, if any.
    pub fn handle_event(&mut self, event: GattEvent) -> Option<FollowUp> {
        if self.state == EngineState::Idle {
            // Stale callbacks can trail in after close()
            trace!("Ignoring event while idle: {:?}", event);
            return None;
        }

        match event {
            GattEvent::ServiceAdded { status } => {
                if status == 0 {
                    info!("GATT service installed");
                    self.state = EngineState::ServiceRegistering;
                    Some(FollowUp::StartAdvertisingAfter(ADVERTISE_SETTLE))
                } else {
                    error!("Failed to add GATT service: status {}", status);
                    self.state = EngineState::ServiceFailed;
                    None
                }
            }
            GattEvent::AdvertiseStarted => {
                info!("BLE advertising started");
                self.state = EngineState::Advertising;
                None
            }
            GattEvent::AdvertiseFailed { code } => {
                error!("BLE advertising failed: code {}", code);
                self.state = EngineState::AdvertiseFailed;
                None
            }
            GattEvent::CentralConnected { device } => {
                info!("Central connected: {:#014x}", device);
                self.subscribers.insert(device);
                None
            }
            GattEvent::CentralDisconnected { device } => {
                info!("Central disconnected: {:#014x}", device);
                self.subscribers.remove(&device);
                None
            }
            GattEvent::ReadRequest {
                device,
                request_id,
                characteristic,
            } => {
                // A never-written characteristic answers with an empty value
                // rather than failing the request
                let value = self.values.get(&characteristic).cloned().unwrap_or_default();
                self.host.send_response(device, request_id, &value);
                None
            }
            GattEvent::DescriptorWrite {
                device,
                request_id,
                characteristic,
                descriptor,
                value,
                response_needed,
            } => {
                if descriptor == CCCD_UUID {
                    if value == ENABLE_NOTIFICATION_VALUE {
                        info!("Notifications enabled for {}", characteristic);
                        self.subscribers.insert(device);
                    } else if value == DISABLE_NOTIFICATION_VALUE {
                        // The central may still be listening on other
                        // characteristics of this connection
                        debug!("Notifications disabled for {}", characteristic);
                    }
                } else {
                    debug!("Write to unhandled descriptor {}", descriptor);
                }
                if response_needed {
                    self.host.send_response(device, request_id, &value);
                }
                None
            }
        }
    }

    /// Second half of the timed transition out of `ServiceRegistering`.
    pub fn begin_advertising(&mut self) {
        if self.state != EngineState::ServiceRegistering {
            return;
        }
        self.host.start_advertising(&AdvertiseConfig {
            service_uuid: self.config.service_uuid,
            device_name: self.config.device_name.clone(),
            include_device_name: true,
            connectable: true,
            timeout_ms: 0,
            tx_power: TxPower::High,
            mode: AdvertiseMode::LowLatency,
        });
    }

    /// One notification per subscriber; a silent no-op with none.
    pub fn send(&mut self, path: &str, values: &[Value]) {
        if self.subscribers.is_empty() {
            return;
        }
        let Some(characteristic) = self.map.uuid_for(path) else {
            warn!("No characteristic mapping for channel {}", path);
            return;
        };

        let payload = gatt::pack_notify_payload(values);
        self.values.insert(characteristic, payload.clone());

        for device in &self.subscribers {
            if let Err(e) = self.host.notify(*device, characteristic, &payload) {
                warn!("Notify to {:#014x} failed: {}", device, e);
            }
        }
    }

    /// Return to `Idle` from any state. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == EngineState::Advertising {
            self.host.stop_advertising();
        }
        if self.state != EngineState::Idle {
            self.host.close_server();
            info!("BLE peripheral closed");
        }
        self.subscribers.clear();
        self.values.clear();
        self.state = EngineState::Idle;
    }
}

/// Transport adapter around the engine: shares it with an event pump task
/// that applies stack callbacks and the timed advertise start.
pub struct BlePeripheralClient {
    engine: Arc<Mutex<BlePeripheralEngine>>,
    events: Option<mpsc::UnboundedReceiver<GattEvent>>,
    pump: Option<JoinHandle<()>>,
}

impl BlePeripheralClient {
    pub fn new<'a>(
        host: Arc<dyn GattHost>,
        config: BleConfig,
        channel_paths: impl IntoIterator<Item = &'a str>,
        events: mpsc::UnboundedReceiver<GattEvent>,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(BlePeripheralEngine::new(
                host,
                config,
                channel_paths,
            ))),
            events: Some(events),
            pump: None,
        }
    }
}

#[async_trait]
impl TransportClient for BlePeripheralClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.engine.lock().unwrap().connect()?;

        // The pump outlives close() so the same client can reconnect; it
        // ends when the host adapter drops its event sender
        if let Some(mut events) = self.events.take() {
            let engine = Arc::clone(&self.engine);
            self.pump = Some(tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let follow_up = engine.lock().unwrap().handle_event(event);
                    if let Some(FollowUp::StartAdvertisingAfter(delay)) = follow_up {
                        tokio::time::sleep(delay).await;
                        engine.lock().unwrap().begin_advertising();
                    }
                }
            }));
        }
        Ok(())
    }

    async fn send(&mut self, path: &str, values: &[Value]) {
        self.engine.lock().unwrap().send(path, values);
    }

    fn is_connected(&self) -> bool {
        // Advertising doubles as the readiness flag; whether anything is
        // actually delivered is gated by the subscriber set
        self.engine.lock().unwrap().state() == EngineState::Advertising
    }

    async fn close(&mut self) {
        self.engine.lock().unwrap().close();
    }
}

impl Drop for BlePeripheralClient {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
