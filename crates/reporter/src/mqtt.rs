use crate::{
    payload::{ConnectionPayload, DetectionPayload, StatsPayload, StatusPayload},
    record::{DetectionRecord, StatsSummary},
    session::SystemStatus,
    sink::{ReportSink, SinkError},
};
use chrono::Local;
use rumqttc::{Client, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

const CLOSE_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    pub device_id: String,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic_prefix: "ring-inspector".to_string(),
            device_id: "ring-inspector".to_string(),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl MqttSettings {
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), suffix)
    }
}

/// Report sink publishing JSON documents to an MQTT broker.
///
/// Detections are keyed by capture time under `detections/`; status,
/// statistics and the connection marker are retained so the latest write
/// replaces the previous one.
pub struct MqttSink {
    client: Client,
    settings: MqttSettings,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MqttSink {
    /// Connects and waits for the broker's acknowledgement.
    ///
    /// Fails with [`SinkError::Unavailable`] when no ConnAck arrives within
    /// `connect_timeout`; the background worker is stopped in that case.
    pub fn connect(settings: &MqttSettings, session_id: &str) -> Result<Self, SinkError> {
        let client_id = format!("{}-{}", settings.device_id, session_id);
        let mut mqtt_options = MqttOptions::new(client_id, settings.host.as_str(), settings.port);
        mqtt_options.set_keep_alive(settings.keep_alive);
        mqtt_options.set_clean_session(true);

        let (client, mut connection) = Client::new(mqtt_options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connected_clone = Arc::clone(&connected);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker = std::thread::spawn(move || {
            let mut reconnect_attempts = 0u32;

            'outer: loop {
                for notification in connection.iter() {
                    if shutdown_clone.load(Ordering::Acquire) {
                        break 'outer;
                    }
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected_clone.store(true, Ordering::Release);
                            reconnect_attempts = 0;
                            tracing::info!("MQTT connected to broker");
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            connected_clone.store(false, Ordering::Release);
                            break 'outer;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            connected_clone.store(false, Ordering::Release);
                            if matches!(e, ConnectionError::RequestsDone) {
                                break 'outer;
                            }
                            reconnect_attempts = reconnect_attempts.saturating_add(1);
                            let backoff = calculate_backoff(reconnect_attempts);
                            tracing::warn!(
                                error = %e,
                                attempt = reconnect_attempts,
                                backoff_ms = backoff.as_millis(),
                                "MQTT connection lost, reconnecting"
                            );
                            if !sleep_unless(&shutdown_clone, backoff) {
                                break 'outer;
                            }
                        }
                    }
                }

                connected_clone.store(false, Ordering::Release);
                if shutdown_clone.load(Ordering::Acquire) {
                    break;
                }
                reconnect_attempts = reconnect_attempts.saturating_add(1);
                if !sleep_unless(&shutdown_clone, calculate_backoff(reconnect_attempts)) {
                    break;
                }
            }
            tracing::debug!("MQTT event loop stopped");
        });

        let mut sink = Self {
            client,
            settings: settings.clone(),
            connected,
            shutdown,
            worker: Some(worker),
        };

        let deadline = Instant::now() + settings.connect_timeout;
        while !sink.is_connected() {
            if Instant::now() >= deadline {
                sink.shutdown.store(true, Ordering::Release);
                sink.worker.take();
                return Err(SinkError::Unavailable(format!(
                    "no answer from {}:{} within {}s",
                    settings.host,
                    settings.port,
                    settings.connect_timeout.as_secs_f32()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let marker = ConnectionPayload {
            timestamp: Local::now().to_rfc3339(),
            status: "connected",
            session_id,
            device_id: &settings.device_id,
        };
        sink.publish("system/last_connection", &marker, true)?;

        tracing::info!(
            broker = %format!("{}:{}", settings.host, settings.port),
            prefix = %settings.topic_prefix,
            "MQTT sink ready"
        );

        Ok(sink)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    fn publish<T: Serialize>(
        &self,
        suffix: &str,
        payload: &T,
        retain: bool,
    ) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Unavailable("broker connection is down".into()));
        }
        let body = serde_json::to_vec(payload)?;
        // try_publish never blocks the inspection loop on a full queue.
        self.client
            .try_publish(self.settings.topic(suffix), QoS::AtLeastOnce, retain, body)?;
        Ok(())
    }
}

impl ReportSink for MqttSink {
    fn report(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
        let suffix = format!("detections/{}", record.key());
        self.publish(&suffix, &DetectionPayload::from(record), false)?;
        tracing::debug!(
            defect_type = %record.defect_type,
            key = record.key(),
            "Detection published"
        );
        Ok(())
    }

    fn heartbeat(&mut self, status: &SystemStatus) -> Result<(), SinkError> {
        self.publish("system/status", &StatusPayload::from(status), true)
    }

    fn flush_stats(&mut self, session_id: &str, stats: &StatsSummary) -> Result<(), SinkError> {
        let suffix = format!("statistics/{session_id}");
        self.publish(&suffix, &StatsPayload::new(session_id, stats, Local::now()), true)
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if !self.is_connected() {
            self.shutdown.store(true, Ordering::Release);
        } else if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "MQTT disconnect request failed");
        }

        let deadline = Instant::now() + CLOSE_GRACE;
        while !worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        self.shutdown.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);

        if worker.is_finished() {
            let _ = worker.join();
        }
        tracing::info!("MQTT sink closed");
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sleeps in short slices; returns false if shutdown was requested meanwhile.
fn sleep_unless(shutdown: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Acquire) {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - Instant::now()));
    }
    !shutdown.load(Ordering::Acquire)
}

/// Exponential backoff with jitter, capped at 30 seconds
fn calculate_backoff(attempt: u32) -> Duration {
    const BASE_MS: u64 = 100;
    const MAX_MS: u64 = 30_000;

    let capped = BASE_MS
        .saturating_mul(2u64.saturating_pow(attempt.min(10)))
        .min(MAX_MS);
    let jitter = (capped / 10).max(1);

    Duration::from_millis(capped.saturating_add(fastrand::u64(0..jitter)))
}
