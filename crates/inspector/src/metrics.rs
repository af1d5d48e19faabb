use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Loop instruments on the global meter; no-ops until a provider is installed.
pub struct LoopMetrics {
    frames: Counter<u64>,
    defects: Counter<u64>,
    report_failures: Counter<u64>,
    detect_duration: Histogram<f64>,
}

impl LoopMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];

        Self {
            frames: meter
                .u64_counter("inspector_frames_total")
                .with_description("Frames that went through detection")
                .build(),
            defects: meter
                .u64_counter("inspector_defects_total")
                .with_description("Frames reported as defective")
                .build(),
            report_failures: meter
                .u64_counter("inspector_report_failures_total")
                .with_description("Sink calls that did not go through")
                .build(),
            detect_duration: meter
                .f64_histogram("inspector_detect_duration_seconds")
                .with_description("Time spent in the detector per frame")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    pub fn frame(&self) {
        self.frames.add(1, &[]);
    }

    pub fn defect(&self, defect_type: &str) {
        self.defects
            .add(1, &[KeyValue::new("defect_type", defect_type.to_string())]);
    }

    pub fn report_failure(&self, operation: &'static str) {
        self.report_failures
            .add(1, &[KeyValue::new("operation", operation)]);
    }

    pub fn detect_duration(&self, seconds: f64) {
        self.detect_duration.record(seconds, &[]);
    }
}
