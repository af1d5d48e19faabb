use crate::{
    config::LoopSettings,
    error::InspectError,
    metrics::LoopMetrics,
    pacer::Pacer,
    persist::DetectionArchive,
    policy::{Defect, DetectionPolicy},
    state::{LoopState, RunOutcome, StopReason},
    stats::SessionStats,
};
use capture::{Acquired, CaptureError, Frame, FrameSource};
use chrono::Local;
use inference::Detector;
use reporter::{DetectionRecord, ReportSink, Reporter, Session, StatsSummary};
use std::{path::PathBuf, time::Instant};

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_id: String,
    pub outcome: RunOutcome,
    pub stats: StatsSummary,
    pub iterations: u64,
    pub backoff_sleeps: u32,
    pub reports_sent: u64,
    pub reports_failed: u64,
    pub output_dir: Option<PathBuf>,
}

/// Capture, detect, classify and report, one frame per iteration.
///
/// The loop owns its source, detector and sink exclusively. Draining
/// (final statistics, inactive heartbeat, source release) happens exactly
/// once: at the end of [`InspectionLoop::run`], or from `Drop` when the run
/// is cut short by a panic.
pub struct InspectionLoop<S: FrameSource, D: Detector, R: ReportSink, P: Pacer> {
    source: S,
    detector: D,
    reporter: Reporter<R>,
    pacer: P,
    policy: DetectionPolicy,
    archive: Option<DetectionArchive>,
    settings: LoopSettings,
    session: Session,
    stats: SessionStats,
    state: LoopState,
    metrics: LoopMetrics,
    source_id: String,
    started: Option<Instant>,
    iteration: u64,
    backoff_sleeps: u32,
}

impl<S: FrameSource, D: Detector, R: ReportSink, P: Pacer> InspectionLoop<S, D, R, P> {
    pub fn new(
        source: S,
        detector: D,
        reporter: Reporter<R>,
        pacer: P,
        policy: DetectionPolicy,
        settings: LoopSettings,
    ) -> Self {
        let source_id = source.describe();
        Self {
            source,
            detector,
            reporter,
            pacer,
            policy,
            archive: None,
            settings,
            session: Session::start(Local::now()),
            stats: SessionStats::new(),
            state: LoopState::Idle,
            metrics: LoopMetrics::new("inspector"),
            source_id,
            started: None,
            iteration: 0,
            backoff_sleeps: 0,
        }
    }

    /// Continue a session created by the caller, e.g. one the sink was
    /// already opened for.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Save annotated defect frames here. Ignored when saving is disabled.
    pub fn with_archive(mut self, archive: DetectionArchive) -> Self {
        if self.settings.save_detections {
            self.archive = Some(archive);
        }
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until a stop condition or a fatal error, then drain.
    pub fn run(mut self) -> Result<RunSummary, InspectError> {
        tracing::info!(
            session_id = %self.session.session_id,
            source = %self.source_id,
            online = self.reporter.is_online(),
            threshold = self.policy.threshold(),
            "Inspection session starting"
        );
        self.started = Some(Instant::now());
        self.heartbeat();

        let result = self.start().and_then(|stopped| match stopped {
            Some(reason) => Ok(reason),
            None => self.run_frames(),
        });

        match result {
            Ok(reason) => Ok(self.drain(RunOutcome::Completed(reason))),
            Err(e) => {
                tracing::error!(error = %e, "Inspection stopped on fatal error");
                self.drain(RunOutcome::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Idle -> Connecting -> Running, going through Reconnecting if the
    /// first connection attempt fails.
    fn start(&mut self) -> Result<Option<StopReason>, InspectError> {
        self.transition(LoopState::Connecting);
        match self.source.connect() {
            Ok(()) => {
                self.transition(LoopState::Running);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(operation = "connect", error = %e, "Frame source not ready");
                self.recover(1, e)
            }
        }
    }

    fn run_frames(&mut self) -> Result<StopReason, InspectError> {
        loop {
            if let Some(reason) = self.stop_reason() {
                return Ok(reason);
            }

            self.iteration += 1;
            let span = tracing::info_span!(
                "inspect_frame",
                iteration = self.iteration,
                source = %self.source_id
            );
            let _enter = span.enter();

            match self.source.next_frame() {
                Ok(Acquired::Frame(frame)) => self.inspect(frame),
                Ok(Acquired::EndOfStream) => return Ok(StopReason::Exhausted),
                Err(e) if e.is_transient() => {
                    tracing::warn!(operation = "capture", error = %e, "Frame skipped");
                    self.stats.record_dropped();
                }
                Err(e) => {
                    tracing::warn!(operation = "capture", error = %e, "Frame source lost");
                    // a lost read is not a failed connect; always try once
                    if let Some(reason) = self.recover(0, e)? {
                        return Ok(reason);
                    }
                    // the backoff already spaced this attempt out
                    continue;
                }
            }

            self.periodic_reports();

            if let Some(reason) = self.stop_reason() {
                return Ok(reason);
            }
            if !self.pacer.pause(self.settings.interval) {
                return Ok(StopReason::Interrupted);
            }
        }
    }

    /// Reconnect with a fixed backoff until the failure budget is spent.
    ///
    /// `failures` counts connect attempts that already failed: 1 when the
    /// initial connect was refused, 0 when a running source dropped a read.
    /// Returns `Some(Interrupted)` if a stop arrived while backing off.
    fn recover(
        &mut self,
        mut failures: u32,
        mut cause: CaptureError,
    ) -> Result<Option<StopReason>, InspectError> {
        self.transition(LoopState::Reconnecting);

        loop {
            if failures >= self.settings.reconnect_attempts {
                return Err(InspectError::CameraLost {
                    attempts: failures,
                    source: cause,
                });
            }

            tracing::info!(
                attempt = failures,
                budget = self.settings.reconnect_attempts,
                backoff_secs = self.settings.reconnect_backoff.as_secs_f32(),
                "Reconnecting frame source"
            );
            self.backoff_sleeps += 1;
            if !self.pacer.pause(self.settings.reconnect_backoff) {
                return Ok(Some(StopReason::Interrupted));
            }

            match self.source.connect() {
                Ok(()) => {
                    tracing::info!(failures, "Frame source reconnected");
                    self.transition(LoopState::Running);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::warn!(operation = "connect", attempt = failures + 1, error = %e, "Reconnect failed");
                    failures += 1;
                    cause = e;
                }
            }
        }
    }

    fn inspect(&mut self, frame: Frame) {
        let detect_started = Instant::now();
        let detections = match self.detector.detect(&frame.image) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(operation = "detect", error = %e, origin = %frame.origin, "Detection failed, frame dropped");
                self.stats.record_dropped();
                return;
            }
        };
        self.metrics
            .detect_duration(detect_started.elapsed().as_secs_f64());
        self.metrics.frame();

        self.session.capture_count += 1;
        self.session.last_capture = Some(frame.captured_at);

        let evaluation = self.policy.evaluate(&detections);
        let Some(defect) = evaluation.reportable() else {
            tracing::debug!(raw = detections.len(), "Frame clean");
            self.stats.record(None);
            return;
        };

        self.session.defect_count += 1;
        self.metrics.defect(&defect.label);
        tracing::info!(
            defect_type = %defect.label,
            confidence = defect.confidence,
            defects = evaluation.defects.len(),
            origin = %frame.origin,
            "Defect detected"
        );

        let image_reference = self.persist(&frame, &defect, &evaluation.defects);
        let record = DetectionRecord::new(
            frame.captured_at,
            &defect.label,
            defect.confidence,
            self.session.session_id.as_str(),
        )
        .with_ring_count(evaluation.defects.len() as u32)
        .with_image_reference(image_reference);

        if !self.reporter.report(&record) && self.reporter.is_online() {
            self.metrics.report_failure("report");
        }
        self.stats.record(Some(&defect));
    }

    fn persist(&self, frame: &Frame, primary: &Defect, defects: &[Defect]) -> Option<String> {
        let archive = self.archive.as_ref()?;
        match archive.save(frame, &primary.label, defects) {
            Ok(filename) => {
                tracing::debug!(file = %filename, "Annotated frame saved");
                Some(filename)
            }
            Err(e) => {
                tracing::warn!(operation = "persist", error = %e, "Annotated frame not saved");
                None
            }
        }
    }

    fn periodic_reports(&mut self) {
        let every = self.settings.heartbeat_every;
        if every > 0 && self.iteration.is_multiple_of(every) {
            self.heartbeat();
        }
        let every = self.settings.stats_every;
        if every > 0 && self.iteration.is_multiple_of(every) {
            self.flush_stats();
        }
    }

    fn heartbeat(&mut self) {
        let status = self.session.status(Local::now());
        if !self.reporter.heartbeat(&status) && self.reporter.is_online() {
            self.metrics.report_failure("heartbeat");
        }
    }

    fn flush_stats(&mut self) {
        let snapshot = self.stats.snapshot();
        if !self
            .reporter
            .flush_stats(&self.session.session_id, &snapshot)
            && self.reporter.is_online()
        {
            self.metrics.report_failure("flush_stats");
        }
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.pacer.stop_requested() {
            return Some(StopReason::Interrupted);
        }
        if self.source.is_exhausted() {
            return Some(StopReason::Exhausted);
        }
        if let Some(max) = self.settings.max_captures
            && self.iteration >= max
        {
            return Some(StopReason::MaxCaptures);
        }
        if let (Some(max), Some(started)) = (self.settings.max_duration, self.started)
            && started.elapsed() >= max
        {
            return Some(StopReason::MaxDuration);
        }
        None
    }

    fn transition(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Draining -> Stopped. Sink failures are swallowed by the reporter.
    fn drain(&mut self, outcome: RunOutcome) -> RunSummary {
        self.transition(LoopState::Draining);
        self.session.running = false;

        self.flush_stats();
        self.heartbeat();
        self.source.release();
        self.reporter.close();

        self.transition(LoopState::Stopped);

        let stats = self.stats.snapshot();
        let output_dir = self.archive.as_ref().map(|a| a.dir().to_path_buf());
        tracing::info!(
            session_id = %self.session.session_id,
            captures = stats.total_captures,
            defects = stats.total_defects,
            dropped = stats.dropped_frames,
            reports_sent = self.reporter.sent(),
            output_dir = ?output_dir,
            outcome = %outcome,
            "Inspection stopped"
        );

        RunSummary {
            session_id: self.session.session_id.clone(),
            outcome,
            stats,
            iterations: self.iteration,
            backoff_sleeps: self.backoff_sleeps,
            reports_sent: self.reporter.sent(),
            reports_failed: self.reporter.failed(),
            output_dir,
        }
    }
}

impl<S: FrameSource, D: Detector, R: ReportSink, P: Pacer> Drop for InspectionLoop<S, D, R, P> {
    fn drop(&mut self) {
        if !self.state.is_live() {
            return;
        }
        let cause = if std::thread::panicking() {
            "panicked"
        } else {
            "dropped before completion"
        };
        tracing::warn!(state = %self.state, cause, "Draining interrupted session");
        self.drain(RunOutcome::Failed(cause.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::FrameOrigin;
    use image::RgbImage;
    use inference::{BoundingBox, DetectorError, RawDetection};
    use reporter::{SinkError, SystemStatus};
    use std::{cell::RefCell, rc::Rc, time::Duration};

    #[derive(Default)]
    struct Tape {
        records: Vec<DetectionRecord>,
        statuses: Vec<SystemStatus>,
        stats: Vec<StatsSummary>,
        closed: bool,
    }

    struct TapeSink(Rc<RefCell<Tape>>);

    impl ReportSink for TapeSink {
        fn report(&mut self, record: &DetectionRecord) -> Result<(), SinkError> {
            self.0.borrow_mut().records.push(record.clone());
            Ok(())
        }
        fn heartbeat(&mut self, status: &SystemStatus) -> Result<(), SinkError> {
            self.0.borrow_mut().statuses.push(status.clone());
            Ok(())
        }
        fn flush_stats(&mut self, _: &str, stats: &StatsSummary) -> Result<(), SinkError> {
            self.0.borrow_mut().stats.push(stats.clone());
            Ok(())
        }
        fn close(&mut self) {
            self.0.borrow_mut().closed = true;
        }
    }

    struct Frames {
        remaining: u32,
    }

    impl FrameSource for Frames {
        fn connect(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn next_frame(&mut self) -> Result<Acquired, CaptureError> {
            if self.remaining == 0 {
                return Ok(Acquired::EndOfStream);
            }
            self.remaining -= 1;
            Ok(Acquired::Frame(Frame::new(
                RgbImage::new(8, 8),
                FrameOrigin::Camera("stub".into()),
            )))
        }
        fn describe(&self) -> String {
            "stub".into()
        }
    }

    struct Always(Vec<RawDetection>);

    impl Detector for Always {
        fn detect(&mut self, _: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct Panics;

    impl Detector for Panics {
        fn detect(&mut self, _: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
            panic!("detector blew up");
        }
    }

    #[derive(Default)]
    struct CountingPacer(u32);

    impl Pacer for CountingPacer {
        fn pause(&mut self, _: Duration) -> bool {
            self.0 += 1;
            true
        }
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            interval: Duration::ZERO,
            heartbeat_every: 0,
            save_detections: false,
            ..Default::default()
        }
    }

    fn crack(confidence: f32) -> RawDetection {
        RawDetection::new("crack", confidence, BoundingBox::new(0.0, 0.0, 4.0, 4.0))
    }

    #[test]
    fn max_captures_bounds_an_endless_source() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        let inspection = InspectionLoop::new(
            Frames { remaining: u32::MAX },
            Always(vec![]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            CountingPacer::default(),
            DetectionPolicy::default(),
            LoopSettings {
                max_captures: Some(4),
                ..settings()
            },
        );

        let summary = inspection.run().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed(StopReason::MaxCaptures));
        assert_eq!(summary.stats.total_captures, 4);
        assert_eq!(summary.iterations, 4);
        assert!(tape.borrow().records.is_empty());
    }

    #[test]
    fn zero_duration_stops_before_first_capture() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        let summary = InspectionLoop::new(
            Frames { remaining: 5 },
            Always(vec![crack(0.9)]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            CountingPacer::default(),
            DetectionPolicy::default(),
            LoopSettings {
                max_duration: Some(Duration::ZERO),
                ..settings()
            },
        )
        .run()
        .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed(StopReason::MaxDuration));
        assert_eq!(summary.stats.total_captures, 0);
    }

    #[test]
    fn heartbeats_follow_the_cadence_and_end_inactive() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        InspectionLoop::new(
            Frames { remaining: 4 },
            Always(vec![]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            CountingPacer::default(),
            DetectionPolicy::default(),
            LoopSettings {
                heartbeat_every: 2,
                stats_every: 3,
                ..settings()
            },
        )
        .run()
        .unwrap();

        let tape = tape.borrow();
        // start, iterations 2 and 4, drain
        assert_eq!(tape.statuses.len(), 4);
        assert!(tape.statuses[..3].iter().all(|s| s.is_active));
        let last = tape.statuses.last().unwrap();
        assert!(!last.is_active);
        assert_eq!(last.capture_count, 4);
        // iteration 3, drain
        assert_eq!(tape.stats.len(), 2);
        assert!(tape.closed);
    }

    #[test]
    fn ring_count_is_the_number_of_qualifying_defects() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        InspectionLoop::new(
            Frames { remaining: 1 },
            Always(vec![crack(0.7), crack(0.3), crack(0.8)]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            CountingPacer::default(),
            DetectionPolicy::default(),
            settings(),
        )
        .run()
        .unwrap();

        let tape = tape.borrow();
        assert_eq!(tape.records.len(), 1);
        assert_eq!(tape.records[0].ring_count, 2);
        assert_eq!(tape.records[0].confidence, 0.8);
        assert_eq!(tape.records[0].image_reference, None);
    }

    #[test]
    fn no_sleep_after_terminal_iteration() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        let pacer = Rc::new(RefCell::new(0u32));

        struct SharedPacer(Rc<RefCell<u32>>);
        impl Pacer for SharedPacer {
            fn pause(&mut self, _: Duration) -> bool {
                *self.0.borrow_mut() += 1;
                true
            }
        }

        InspectionLoop::new(
            Frames { remaining: 3 },
            Always(vec![]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            SharedPacer(Rc::clone(&pacer)),
            DetectionPolicy::default(),
            LoopSettings {
                max_captures: Some(3),
                ..settings()
            },
        )
        .run()
        .unwrap();

        assert_eq!(*pacer.borrow(), 2);
    }

    #[test]
    fn panic_mid_run_still_drains() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        let sink_tape = Rc::clone(&tape);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            InspectionLoop::new(
                Frames { remaining: 3 },
                Panics,
                Reporter::online(TapeSink(sink_tape)),
                CountingPacer::default(),
                DetectionPolicy::default(),
                settings(),
            )
            .run()
        }));

        assert!(result.is_err());
        let tape = tape.borrow();
        assert!(tape.closed);
        assert_eq!(tape.stats.len(), 1);
        assert!(!tape.statuses.last().unwrap().is_active);
    }

    #[test]
    fn dropping_an_unstarted_loop_is_silent() {
        let tape = Rc::new(RefCell::new(Tape::default()));
        let inspection = InspectionLoop::new(
            Frames { remaining: 1 },
            Always(vec![]),
            Reporter::online(TapeSink(Rc::clone(&tape))),
            CountingPacer::default(),
            DetectionPolicy::default(),
            settings(),
        );
        assert_eq!(inspection.state(), LoopState::Idle);
        drop(inspection);

        let tape = tape.borrow();
        assert!(tape.statuses.is_empty());
        assert!(!tape.closed);
    }
}
