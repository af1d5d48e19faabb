use anyhow::Context;
use capture::{FileBatch, FrameSource, IpCamera};
use chrono::Local;
use clap::Parser;
use common::{TelemetryGuard, setup_logging};
use inference::load_detector;
use inspector::{
    Cli, DetectionArchive, DetectionPolicy, InspectError, InspectionLoop, InspectorConfig,
    InterruptiblePacer, SourceKind,
};
use reporter::{MqttSink, Reporter, Session};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::{Arc, atomic::AtomicBool};

fn main() -> anyhow::Result<()> {
    let config = InspectorConfig::try_from(Cli::parse()).context("Invalid configuration")?;

    // TelemetryGuard installs the subscriber itself and needs a live Tokio
    // runtime for its batch exporters.
    let (_telemetry, _runtime) = if let Some(endpoint) = config.otel_endpoint.as_ref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let guard = rt.block_on(async {
            TelemetryGuard::init("ring-inspector", endpoint, config.environment)
        })?;
        (Some(guard), Some(rt))
    } else {
        setup_logging(config.environment, "info");
        (None, None)
    };

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // A second signal while draining exits immediately.
        flag::register_conditional_shutdown(signal, 1, Arc::clone(&stop))?;
        flag::register(signal, Arc::clone(&stop))?;
    }
    tracing::info!(
        "Signal handlers registered (SIGTERM, SIGINT); a second signal exits without final reports"
    );

    tracing::info!("Inspector starting with config: {:?}", config);

    let detector = load_detector(&config.detector).context("Detector unusable")?;
    tracing::info!(model = %config.detector.model_path.display(), "Detector loaded");

    let source: Box<dyn FrameSource> = match &config.source {
        SourceKind::IpCamera { url } => {
            Box::new(IpCamera::new(url.as_str()).map_err(InspectError::SourceInit)?)
        }
        SourceKind::Files(path) => {
            let batch = FileBatch::open(path).map_err(InspectError::SourceInit)?;
            tracing::info!(images = batch.len(), path = %path.display(), "Image batch ready");
            Box::new(batch)
        }
    };

    let session = Session::start(Local::now());
    let reporter = if config.offline {
        tracing::info!("Offline mode requested, reports will not be sent");
        Reporter::offline()
    } else {
        match MqttSink::connect(&config.mqtt, &session.session_id) {
            Ok(sink) => Reporter::online(sink),
            Err(e) => {
                tracing::warn!(operation = "connect", error = %e, "Report sink unavailable, running offline");
                Reporter::offline()
            }
        }
    };

    let inspection = InspectionLoop::new(
        source,
        detector,
        reporter,
        InterruptiblePacer::new(Arc::clone(&stop)),
        DetectionPolicy::new(config.report_threshold),
        config.loop_settings.clone(),
    )
    .with_session(session)
    .with_archive(DetectionArchive::new(&config.output_dir));

    let summary = inspection.run().context("Inspection failed")?;
    tracing::info!(
        session_id = %summary.session_id,
        captures = summary.stats.total_captures,
        defects = summary.stats.total_defects,
        clean = summary.stats.clean_images,
        dropped = summary.stats.dropped_frames,
        reports_sent = summary.reports_sent,
        reports_failed = summary.reports_failed,
        outcome = %summary.outcome,
        "Session complete"
    );

    Ok(())
}
