//! Session orchestrator.
//!
//! The embedding layer feeds raw samples in at native sensor rate; one
//! worker task throttles them per channel, runs change detection (and
//! normalization when enabled) and fans the survivors out through the
//! active transport. Status flows back over an event channel so the
//! embedding layer can render it without ever being blocked on.

use crate::domain::change::should_send;
use crate::domain::channel::{ChannelConfig, ChannelState};
use crate::domain::models::{
    ConnectionStatus, MessageSeverity, PipelineEvent, Sample, StatusMessage, Value,
};
use crate::domain::normalize::normalize;
use crate::domain::settings::Settings;
use crate::infrastructure::transport::{TransportClient, TransportError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Immutable configuration snapshot taken when a session starts.
///
/// Settings edited while a session runs do not reach it; start a new
/// session to apply them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub channels: Vec<ChannelConfig>,
    pub sampling_interval: Duration,
    pub normalize_enabled: bool,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            channels: settings.channel_table(),
            sampling_interval: Duration::from_millis(settings.sampling_interval_ms),
            normalize_enabled: settings.normalize_enabled,
        }
    }
}

/// Handle to a running telemetry session.
pub struct Session {
    sample_tx: Option<mpsc::UnboundedSender<Sample>>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Connect the transport and spawn the worker.
    ///
    /// A transport setup failure is reported through `events` and returned;
    /// no session is created and no retry is attempted.
    pub async fn start(
        config: SessionConfig,
        mut transport: Box<dyn TransportClient>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<Self, TransportError> {
        let _ = events.send(PipelineEvent::ConnectionStatus(ConnectionStatus::Connecting));

        if let Err(e) = transport.connect().await {
            error!("Transport setup failed: {}", e);
            let _ = events.send(PipelineEvent::LogMessage(StatusMessage {
                message: format!("Connection failed: {e}"),
                severity: MessageSeverity::Error,
            }));
            let _ = events.send(PipelineEvent::ConnectionStatus(ConnectionStatus::Error));
            return Err(e);
        }

        let _ = events.send(PipelineEvent::ConnectionStatus(ConnectionStatus::Connected));
        info!(
            "Session started: {} channels, interval {:?}, normalize {}",
            config.channels.len(),
            config.sampling_interval,
            config.normalize_enabled
        );

        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(config, transport, sample_rx, events));

        Ok(Self {
            sample_tx: Some(sample_tx),
            worker: Some(worker),
        })
    }

    /// Feed one reading from the sensor layer. Cheap and non-blocking,
    /// safe to call at native sensor rate.
    pub fn on_sample(&self, path: impl Into<String>, values: Vec<Value>) {
        if let Some(tx) = &self.sample_tx {
            let _ = tx.send(Sample::new(path, values));
        }
    }

    pub fn is_active(&self) -> bool {
        self.sample_tx.is_some()
    }

    /// Stop delivering samples, close the transport, release the worker,
    /// in that order. Calling this twice is a no-op.
    pub async fn stop(&mut self) {
        let Some(tx) = self.sample_tx.take() else {
            return;
        };
        // Dropping the sender lets the worker drain, close the transport
        // and exit on its own
        drop(tx);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        info!("Session stopped");
    }
}

struct ChannelRuntime {
    config: ChannelConfig,
    state: ChannelState,
    last_eval: Option<Instant>,
    /// Newest reading that arrived before its channel's interval elapsed;
    /// earlier ones are simply overwritten
    pending: Option<Vec<Value>>,
}

async fn run_worker(
    config: SessionConfig,
    mut transport: Box<dyn TransportClient>,
    mut samples: mpsc::UnboundedReceiver<Sample>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    let mut channels: HashMap<String, ChannelRuntime> = config
        .channels
        .iter()
        .cloned()
        .map(|c| {
            let runtime = ChannelRuntime {
                state: ChannelState::new(c.arity),
                config: c,
                last_eval: None,
                pending: None,
            };
            (runtime.config.path.clone(), runtime)
        })
        .collect();

    // Tick at a fraction of the interval so a held-back reading is not
    // evaluated much later than its due time
    let tick_period = (config.sampling_interval / 4).max(Duration::from_millis(10));
    let mut tick = interval(tick_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_sample = samples.recv() => {
                match maybe_sample {
                    Some(sample) => {
                        handle_sample(&config, &mut channels, transport.as_mut(), sample).await;
                    }
                    None => break, // session stopped
                }
            }
            _ = tick.tick() => {
                flush_pending(&config, &mut channels, transport.as_mut()).await;
            }
        }
    }

    transport.close().await;
    let _ = events.send(PipelineEvent::ConnectionStatus(ConnectionStatus::Disconnected));
}

async fn handle_sample(
    config: &SessionConfig,
    channels: &mut HashMap<String, ChannelRuntime>,
    transport: &mut dyn TransportClient,
    sample: Sample,
) {
    let Some(runtime) = channels.get_mut(&sample.path) else {
        debug!("Dropping sample for unknown channel {}", sample.path);
        return;
    };
    if !runtime.config.enabled {
        return;
    }
    if sample.values.len() != runtime.config.arity {
        warn!(
            "Arity mismatch on {}: got {}, expected {}",
            sample.path,
            sample.values.len(),
            runtime.config.arity
        );
        return;
    }

    let now = Instant::now();
    if is_due(runtime, now, config.sampling_interval) {
        // A fresh reading supersedes whatever was waiting
        runtime.pending = None;
        evaluate(config, runtime, transport, sample.values, now).await;
    } else {
        runtime.pending = Some(sample.values);
    }
}

async fn flush_pending(
    config: &SessionConfig,
    channels: &mut HashMap<String, ChannelRuntime>,
    transport: &mut dyn TransportClient,
) {
    let now = Instant::now();
    for runtime in channels.values_mut() {
        if runtime.pending.is_some() && is_due(runtime, now, config.sampling_interval) {
            if let Some(values) = runtime.pending.take() {
                evaluate(config, runtime, transport, values, now).await;
            }
        }
    }
}

fn is_due(runtime: &ChannelRuntime, now: Instant, sampling_interval: Duration) -> bool {
    runtime
        .last_eval
        .map_or(true, |last| now.duration_since(last) >= sampling_interval)
}

async fn evaluate(
    config: &SessionConfig,
    runtime: &mut ChannelRuntime,
    transport: &mut dyn TransportClient,
    values: Vec<Value>,
    now: Instant,
) {
    // One evaluation per interval, whether or not it leads to a send
    runtime.last_eval = Some(now);

    let raw: Vec<f32> = values.iter().map(|v| v.as_f32()).collect();
    if !should_send(
        &runtime.config,
        &raw,
        &runtime.state.last_sent,
        config.normalize_enabled,
    ) {
        return;
    }

    let outgoing: Vec<Value> = if config.normalize_enabled {
        raw.iter()
            .map(|v| Value::Float(normalize(runtime.config.scale, *v)))
            .collect()
    } else {
        values
    };

    transport.send(&runtime.config.path, &outgoing).await;

    // The cache tracks what was transmitted, in raw units, so the next
    // evaluation compares against it
    runtime.state.last_sent = raw;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::default_channels;
    use crate::infrastructure::osc;
    use crate::infrastructure::transport::udp::OscUdpClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::UdpSocket;

    const ACCEL: &str = "/sensors/accelerometer";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
        closed: Arc<AtomicBool>,
        fail_connect: bool,
    }

    #[async_trait]
    impl TransportClient for RecordingTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            if self.fail_connect {
                return Err(TransportError::Resolve {
                    host: "nowhere.invalid".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "unresolvable"),
                });
            }
            Ok(())
        }

        async fn send(&mut self, path: &str, values: &[Value]) {
            self.sent
                .lock()
                .unwrap()
                .push((path.to_string(), values.to_vec()));
        }

        fn is_connected(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            channels: default_channels(),
            sampling_interval: Duration::from_millis(200),
            normalize_enabled: false,
        }
    }

    fn floats(values: &[f32]) -> Vec<Value> {
        values.iter().copied().map(Value::Float).collect()
    }

    async fn start_recording(
        config: SessionConfig,
    ) -> (
        Session,
        Arc<Mutex<Vec<(String, Vec<Value>)>>>,
        Arc<AtomicBool>,
        mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let transport = RecordingTransport::default();
        let sent = Arc::clone(&transport.sent);
        let closed = Arc::clone(&transport.closed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::start(config, Box::new(transport), events_tx)
            .await
            .unwrap();
        (session, sent, closed, events_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_sample_is_conflated_until_interval() {
        let (mut session, sent, _, _events) = start_recording(test_config()).await;

        session.on_sample(ACCEL, floats(&[0.0, 0.0, 0.0]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.on_sample(ACCEL, floats(&[0.0, 0.0, 1.0]));
        tokio::time::sleep(Duration::from_millis(400)).await;

        session.stop().await;
        let sent = sent.lock().unwrap();
        // The zero reading matched the initial state; the early reading was
        // held until the interval elapsed, then sent
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ACCEL);
        assert_eq!(sent[0].1, floats(&[0.0, 0.0, 1.0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_reading_is_not_resent() {
        let (mut session, sent, _, _events) = start_recording(test_config()).await;

        session.on_sample(ACCEL, floats(&[1.0, 2.0, 3.0]));
        tokio::time::sleep(Duration::from_millis(250)).await;
        session.on_sample(ACCEL, floats(&[1.0, 2.0, 3.0]));
        tokio::time::sleep(Duration::from_millis(250)).await;

        session.stop().await;
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_and_unknown_channels_are_dropped() {
        let mut config = test_config();
        for channel in &mut config.channels {
            if channel.path == ACCEL {
                channel.enabled = false;
            }
        }
        let (mut session, sent, _, _events) = start_recording(config).await;

        session.on_sample(ACCEL, floats(&[1.0, 2.0, 3.0]));
        session.on_sample("/not/a/channel", floats(&[1.0]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.stop().await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arity_mismatch_is_dropped() {
        let (mut session, sent, _, _events) = start_recording(test_config()).await;

        session.on_sample(ACCEL, floats(&[1.0]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.stop().await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalized_values_are_transmitted() {
        let mut config = test_config();
        config.normalize_enabled = true;
        let (mut session, sent, _, _events) = start_recording(config).await;

        // 100 lux sits exactly in the middle of the logarithmic curve
        session.on_sample("/sensors/light", floats(&[100.0]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.stop().await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let Value::Float(normalized) = sent[0].1[0] else {
            panic!("expected a float");
        };
        assert!((normalized - 0.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_suppresses_small_normalized_changes() {
        let mut config = test_config();
        config.normalize_enabled = true;
        let (mut session, sent, _, _events) = start_recording(config).await;

        // 0.5 on the (-10, 10) range is 0.025 from the initial zero state,
        // under the 0.05 default threshold
        session.on_sample(ACCEL, floats(&[0.5, 0.0, 0.0]));
        tokio::time::sleep(Duration::from_millis(250)).await;
        session.on_sample(ACCEL, floats(&[5.0, 0.0, 0.0]));
        tokio::time::sleep(Duration::from_millis(250)).await;

        session.stop().await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let Value::Float(first) = sent[0].1[0] else {
            panic!("expected a float");
        };
        assert!((first - 0.75).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_transport_and_is_idempotent() {
        let (mut session, _, closed, mut events) = start_recording(test_config()).await;
        assert!(session.is_active());

        session.stop().await;
        assert!(!session.is_active());
        assert!(closed.load(Ordering::SeqCst));

        // Second stop is a no-op
        session.stop().await;

        // Status trail: Connecting, Connected, Disconnected
        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::ConnectionStatus(status) = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error_and_no_session() {
        let transport = RecordingTransport {
            fail_connect: true,
            ..Default::default()
        };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = Session::start(test_config(), Box::new(transport), events_tx).await;
        assert!(result.is_err());

        let mut saw_error_status = false;
        while let Ok(event) = events_rx.try_recv() {
            if let PipelineEvent::ConnectionStatus(ConnectionStatus::Error) = event {
                saw_error_status = true;
            }
        }
        assert!(saw_error_status);
    }

    #[tokio::test]
    async fn test_end_to_end_over_udp() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let transport = OscUdpClient::new("127.0.0.1", port);
        let mut session = Session::start(test_config(), Box::new(transport), events_tx)
            .await
            .unwrap();

        session.on_sample(ACCEL, floats(&[0.0, 0.0, 0.0]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.on_sample(ACCEL, floats(&[0.0, 0.0, 1.0]));

        // Exactly one datagram: the second reading, once the interval elapsed
        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("no datagram arrived")
            .unwrap();
        let message = osc::decode(&buf[..len]).unwrap();
        assert_eq!(message.path, ACCEL);
        assert_eq!(message.values, floats(&[0.0, 0.0, 1.0]));

        let extra =
            tokio::time::timeout(Duration::from_millis(300), listener.recv_from(&mut buf)).await;
        assert!(extra.is_err(), "unexpected second datagram");

        session.stop().await;
    }
}
