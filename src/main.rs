use anyhow::Result;
use osc_sensor_bridge::domain::models::{PipelineEvent, Value};
use osc_sensor_bridge::domain::settings::SettingsService;
use osc_sensor_bridge::infrastructure::logging;
use osc_sensor_bridge::infrastructure::transport::udp::OscUdpClient;
use osc_sensor_bridge::pipeline::{Session, SessionConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Development entry point: reads `"/channel/path value value ..."` lines
/// from stdin and streams them over OSC/UDP with the persisted settings.
/// On a device the sensor layer takes the place of stdin.
#[tokio::main]
async fn main() -> Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = logging::init_logger(&settings.log_settings)?;

    info!(
        "Starting sensor bridge, target {}:{}",
        settings.target_host, settings.target_port
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::ConnectionStatus(status) => info!("Status: {:?}", status),
                PipelineEvent::LogMessage(message) => info!("{}", message.message),
            }
        }
    });

    let transport = OscUdpClient::new(settings.target_host.clone(), settings.target_port);
    let mut session = Session::start(
        SessionConfig::from_settings(&settings),
        Box::new(transport),
        event_tx,
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some((path, values)) => session.on_sample(path, values),
            None => warn!("Ignoring malformed input line: {}", line),
        }
    }

    session.stop().await;
    Ok(())
}

/// `"/sensors/light 120.5"` → `("/sensors/light", [Float(120.5)])`
fn parse_line(line: &str) -> Option<(String, Vec<Value>)> {
    let mut parts = line.split_whitespace();
    let path = parts.next()?;
    if !path.starts_with('/') {
        return None;
    }

    let mut values = Vec::new();
    for part in parts {
        values.push(Value::Float(part.parse::<f32>().ok()?));
    }
    if values.is_empty() {
        return None;
    }
    Some((path.to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let (path, values) = parse_line("/sensors/accelerometer 0.1 -9.8 0.0").unwrap();
        assert_eq!(path, "/sensors/accelerometer");
        assert_eq!(
            values,
            vec![Value::Float(0.1), Value::Float(-9.8), Value::Float(0.0)]
        );
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("no-slash 1.0").is_none());
        assert!(parse_line("/path").is_none());
        assert!(parse_line("/path one two").is_none());
    }
}
