use crate::{
    error::CaptureError,
    frame::{Frame, FrameOrigin},
    source::{Acquired, FrameSource},
};
use reqwest::blocking::Client;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live source polling a phone IP-webcam snapshot endpoint (e.g. `/shot.jpg`).
///
/// Each call fetches the most recent still, so there is no stale buffer to
/// flush between widely spaced captures.
pub struct IpCamera {
    url: String,
    client: Client,
    connected: bool,
}

impl IpCamera {
    pub fn new(url: impl Into<String>) -> Result<Self, CaptureError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, CaptureError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            connected: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn fetch(&self) -> Result<Vec<u8>, CaptureError> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Disconnected(format!(
                "{} answered {}",
                self.url, status
            )));
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl FrameSource for IpCamera {
    fn connect(&mut self) -> Result<(), CaptureError> {
        tracing::info!(url = %self.url, "Connecting to IP camera");
        self.connected = false;
        self.fetch().map_err(|e| {
            CaptureError::Disconnected(format!(
                "failed to connect to IP camera at {}: {} \
                 (is the IP Webcam app running and on the same network?)",
                self.url, e
            ))
        })?;
        self.connected = true;
        tracing::info!(url = %self.url, "IP camera connected");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Acquired, CaptureError> {
        if !self.connected {
            return Err(CaptureError::Disconnected("camera not connected".into()));
        }

        let bytes = self.fetch().inspect_err(|_| self.connected = false)?;
        let frame = Frame::decode(&bytes, FrameOrigin::Camera(self.url.clone()))?;
        Ok(Acquired::Frame(frame))
    }

    fn release(&mut self) {
        if self.connected {
            self.connected = false;
            tracing::info!(url = %self.url, "Camera connection closed");
        }
    }

    fn describe(&self) -> String {
        format!("IP camera {}", self.url)
    }
}
