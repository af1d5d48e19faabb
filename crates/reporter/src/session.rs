use chrono::{DateTime, Local};

/// One run of the inspection loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub start_time: DateTime<Local>,
    pub running: bool,
    pub capture_count: u64,
    pub defect_count: u64,
    pub last_capture: Option<DateTime<Local>>,
}

impl Session {
    pub fn start(start_time: DateTime<Local>) -> Self {
        Self {
            session_id: session_id_for(&start_time),
            start_time,
            running: true,
            capture_count: 0,
            defect_count: 0,
            last_capture: None,
        }
    }

    /// Snapshot for the heartbeat location.
    pub fn status(&self, now: DateTime<Local>) -> SystemStatus {
        SystemStatus {
            timestamp: now,
            is_active: self.running,
            session_id: self.session_id.clone(),
            capture_count: self.capture_count,
            defect_count: self.defect_count,
            last_capture: self.last_capture,
        }
    }
}

/// `YYYYMMDD_HHMMSS` of the session start, local time.
pub fn session_id_for(start_time: &DateTime<Local>) -> String {
    start_time.format("%Y%m%d_%H%M%S").to_string()
}

/// Current liveness snapshot. Each heartbeat overwrites the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub timestamp: DateTime<Local>,
    pub is_active: bool,
    pub session_id: String,
    pub capture_count: u64,
    pub defect_count: u64,
    pub last_capture: Option<DateTime<Local>>,
}

impl SystemStatus {
    pub fn status_label(&self) -> &'static str {
        if self.is_active { "running" } else { "stopped" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_id_derives_from_start_time() {
        let start = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let session = Session::start(start);
        assert_eq!(session.session_id, "20250102_030405");
        assert!(session.running);
        assert_eq!(session.capture_count, 0);
    }

    #[test]
    fn status_reflects_session() {
        let start = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut session = Session::start(start);
        session.capture_count = 7;
        session.defect_count = 2;

        let status = session.status(start);
        assert!(status.is_active);
        assert_eq!(status.status_label(), "running");
        assert_eq!((status.capture_count, status.defect_count), (7, 2));

        session.running = false;
        assert_eq!(session.status(start).status_label(), "stopped");
    }
}
