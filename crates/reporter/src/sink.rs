use crate::{
    record::{DetectionRecord, StatsSummary},
    session::SystemStatus,
};
use common::RetryPolicy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish: {0}")]
    Publish(#[from] rumqttc::ClientError),
}

impl SinkError {
    /// Only a rejected publish (full request queue) may clear up on its own.
    /// A down broker or an unserializable payload fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Publish(_))
    }
}

/// Downstream persistence for detections, heartbeats and statistics.
///
/// Each call writes one complete payload or nothing.
pub trait ReportSink {
    fn report(&mut self, record: &DetectionRecord) -> Result<(), SinkError>;

    /// Overwrite the current status snapshot.
    fn heartbeat(&mut self, status: &SystemStatus) -> Result<(), SinkError>;

    fn flush_stats(&mut self, session_id: &str, stats: &StatsSummary) -> Result<(), SinkError>;

    fn close(&mut self) {}
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn report(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
        (**self).report(record)
    }

    fn heartbeat(&mut self, status: &SystemStatus) -> Result<(), SinkError> {
        (**self).heartbeat(status)
    }

    fn flush_stats(&mut self, session_id: &str, stats: &StatsSummary) -> Result<(), SinkError> {
        (**self).flush_stats(session_id, stats)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Front for an optional sink.
///
/// Without a sink (offline mode) every call is a logged no-op returning
/// `false`. With one, retryable failures are retried, every failed call is
/// logged once at warn level with the operation name, and reported as
/// `false`; nothing propagates to the caller.
pub struct Reporter<S> {
    sink: Option<S>,
    retry: RetryPolicy,
    sent: u64,
    failed: u64,
}

impl<S: ReportSink> Reporter<S> {
    pub fn online(sink: S) -> Self {
        Self {
            sink: Some(sink),
            retry: RetryPolicy::default(),
            sent: 0,
            failed: 0,
        }
    }

    pub fn offline() -> Self {
        Self {
            sink: None,
            retry: RetryPolicy::default(),
            sent: 0,
            failed: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_online(&self) -> bool {
        self.sink.is_some()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn report(&mut self, record: &DetectionRecord) -> bool {
        self.call("report", |sink| sink.report(record))
    }

    pub fn heartbeat(&mut self, status: &SystemStatus) -> bool {
        self.call("heartbeat", |sink| sink.heartbeat(status))
    }

    pub fn flush_stats(&mut self, session_id: &str, stats: &StatsSummary) -> bool {
        self.call("flush_stats", |sink| sink.flush_stats(session_id, stats))
    }

    pub fn close(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.close();
        }
    }

    fn call<F>(&mut self, operation: &str, mut f: F) -> bool
    where
        F: FnMut(&mut S) -> Result<(), SinkError>,
    {
        let Some(sink) = self.sink.as_mut() else {
            tracing::debug!(operation, "Offline mode, not sent");
            return false;
        };

        let result = self
            .retry
            .run_if(operation, SinkError::is_retryable, || f(sink));
        match result {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(operation, error = %e, "Sink call failed");
                false
            }
        }
    }
}
