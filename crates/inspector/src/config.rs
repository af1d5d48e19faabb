use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use common::Environment;
use inference::DetectorConfig;
use reporter::MqttSettings;
use std::{path::PathBuf, time::Duration};

use crate::{persist::DEFAULT_OUTPUT_DIR, policy::DEFAULT_REPORT_THRESHOLD};

/// Shutdown behaviour shown under `--help`.
pub const SIGNAL_HELP: &str = "SIGINT/SIGTERM stops after the current step and sends the final \
statistics and an inactive status. A second signal exits at once with status 1 and skips \
those final reports.";

/// Value of `--source` that selects the live camera.
pub const IP_CAMERA_SOURCE: &str = "ip_camera";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ring-inspector",
    version,
    about = "Capture, detect and report ring defects",
    after_help = SIGNAL_HELP
)]
pub struct Cli {
    /// `ip_camera`, an image directory, or a single image file
    #[arg(long, env = "SOURCE", default_value = IP_CAMERA_SOURCE)]
    pub source: String,

    #[arg(long, env = "CAMERA_URL", default_value = "http://192.168.0.192:8080/shot.jpg")]
    pub camera_url: String,

    #[arg(long = "model", env = "MODEL_PATH", default_value = "runs/detect/train/weights/best.onnx")]
    pub model_path: PathBuf,

    /// Detector class names, in class-index order
    #[arg(long, env = "CLASS_NAMES", value_delimiter = ',', default_value = "breakage,crack,scratch")]
    pub class_names: Vec<String>,

    /// Detector candidate threshold
    #[arg(long = "conf", env = "CONFIDENCE_THRESHOLD", default_value_t = 0.5)]
    pub confidence_threshold: f32,

    /// Minimum confidence for a defect to be reported
    #[arg(long, env = "REPORT_THRESHOLD", default_value_t = DEFAULT_REPORT_THRESHOLD)]
    pub report_threshold: f32,

    #[arg(long, env = "IOU_THRESHOLD", default_value_t = 0.45)]
    pub iou_threshold: f32,

    #[arg(long, env = "INPUT_SIZE", default_value_t = 640)]
    pub input_size: u32,

    /// Seconds between captures
    #[arg(long, env = "CAPTURE_INTERVAL_SECS", default_value_t = 5.0)]
    pub interval: f64,

    #[arg(long, env = "MAX_CAPTURES")]
    pub max_captures: Option<u64>,

    /// Stop after this many minutes
    #[arg(long, env = "MAX_DURATION_MINUTES")]
    pub duration: Option<f64>,

    #[arg(long, env = "RECONNECT_ATTEMPTS", default_value_t = 3)]
    pub reconnect_attempts: u32,

    #[arg(long, env = "RECONNECT_BACKOFF_SECS", default_value_t = 5.0)]
    pub reconnect_backoff_secs: f64,

    #[arg(long, env = "DETECTION_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long, env = "SAVE_DETECTIONS", default_value_t = true, action = ArgAction::Set)]
    pub save_detections: bool,

    /// Do not write annotated frames
    #[arg(long)]
    pub no_save: bool,

    /// Push a heartbeat every N iterations
    #[arg(long, env = "HEARTBEAT_EVERY", default_value_t = 10)]
    pub heartbeat_every: u64,

    /// Flush statistics every N iterations; 0 flushes only on shutdown
    #[arg(long, env = "STATS_EVERY", default_value_t = 0)]
    pub stats_every: u64,

    /// Run without a report sink
    #[arg(long, env = "OFFLINE")]
    pub offline: bool,

    #[arg(long, env = "MQTT_BROKER_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_TOPIC_PREFIX", default_value = "ring-inspector")]
    pub mqtt_topic_prefix: String,

    #[arg(long, env = "MQTT_DEVICE_ID", default_value = "ring-inspector")]
    pub device_id: String,

    #[arg(long, env = "MQTT_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub mqtt_connect_timeout_secs: u64,

    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: Environment,

    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    IpCamera { url: String },
    Files(PathBuf),
}

/// Knobs of the inspection loop itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub interval: Duration,
    pub max_captures: Option<u64>,
    pub max_duration: Option<Duration>,
    /// Connection failures tolerated before the camera is declared lost
    pub reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
    /// 0 disables periodic heartbeats
    pub heartbeat_every: u64,
    /// 0 disables periodic statistics flushes
    pub stats_every: u64,
    pub save_detections: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_captures: None,
            max_duration: None,
            reconnect_attempts: 3,
            reconnect_backoff: Duration::from_secs(5),
            heartbeat_every: 10,
            stats_every: 0,
            save_detections: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub source: SourceKind,
    pub detector: DetectorConfig,
    pub report_threshold: f32,
    pub loop_settings: LoopSettings,
    pub output_dir: PathBuf,
    pub offline: bool,
    pub mqtt: MqttSettings,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{name} must be a finite, non-negative number of seconds, got {value}"))
}

impl TryFrom<Cli> for InspectorConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        if !(0.0..=1.0).contains(&cli.report_threshold) {
            bail!("report threshold {} outside [0, 1]", cli.report_threshold);
        }

        let detector = DetectorConfig {
            model_path: cli.model_path,
            input_size: cli.input_size,
            confidence_threshold: cli.confidence_threshold,
            iou_threshold: cli.iou_threshold,
            class_names: cli
                .class_names
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            ..Default::default()
        };
        detector.validate()?;

        let max_duration = cli
            .duration
            .map(|minutes| seconds("duration", minutes * 60.0))
            .transpose()?;

        let loop_settings = LoopSettings {
            interval: seconds("interval", cli.interval)?,
            max_captures: cli.max_captures,
            max_duration,
            reconnect_attempts: cli.reconnect_attempts,
            reconnect_backoff: seconds("reconnect backoff", cli.reconnect_backoff_secs)?,
            heartbeat_every: cli.heartbeat_every,
            stats_every: cli.stats_every,
            save_detections: cli.save_detections && !cli.no_save,
        };

        let source = if cli.source == IP_CAMERA_SOURCE {
            SourceKind::IpCamera {
                url: cli.camera_url,
            }
        } else {
            SourceKind::Files(PathBuf::from(cli.source))
        };

        let mqtt = MqttSettings {
            host: cli.mqtt_host,
            port: cli.mqtt_port,
            topic_prefix: cli.mqtt_topic_prefix,
            device_id: cli.device_id,
            connect_timeout: Duration::from_secs(cli.mqtt_connect_timeout_secs),
            ..Default::default()
        };

        Ok(Self {
            source,
            detector,
            report_threshold: cli.report_threshold,
            loop_settings,
            output_dir: cli.output_dir,
            offline: cli.offline,
            mqtt,
            environment: cli.environment,
            otel_endpoint: cli.otel_endpoint.filter(|endpoint| !endpoint.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<InspectorConfig> {
        let cli = Cli::try_parse_from(std::iter::once("ring-inspector").chain(args.iter().copied()))?;
        InspectorConfig::try_from(cli)
    }

    #[test]
    fn file_source_with_overrides() {
        let config = parse(&[
            "--source",
            "samples/rings",
            "--interval",
            "0.5",
            "--max-captures",
            "12",
            "--duration",
            "1.5",
            "--report-threshold",
            "0.75",
            "--no-save",
        ])
        .unwrap();

        assert_eq!(config.source, SourceKind::Files(PathBuf::from("samples/rings")));
        assert_eq!(config.loop_settings.interval, Duration::from_millis(500));
        assert_eq!(config.loop_settings.max_captures, Some(12));
        assert_eq!(config.loop_settings.max_duration, Some(Duration::from_secs(90)));
        assert_eq!(config.report_threshold, 0.75);
        assert!(!config.loop_settings.save_detections);
    }

    #[test]
    fn camera_source_uses_camera_url() {
        let config = parse(&[
            "--source",
            "ip_camera",
            "--camera-url",
            "http://10.0.0.7:8080/shot.jpg",
        ])
        .unwrap();

        assert_eq!(
            config.source,
            SourceKind::IpCamera {
                url: "http://10.0.0.7:8080/shot.jpg".into()
            }
        );
    }

    #[test]
    fn class_names_are_comma_separated() {
        let config = parse(&["--source", "x", "--class-names", "breakage, crack,scratch,"]).unwrap();
        assert_eq!(config.detector.class_names, ["breakage", "crack", "scratch"]);
    }

    #[test]
    fn mqtt_settings_are_carried() {
        let config = parse(&[
            "--source",
            "x",
            "--mqtt-host",
            "broker.lan",
            "--mqtt-port",
            "8883",
            "--device-id",
            "bench-1",
            "--mqtt-connect-timeout-secs",
            "2",
            "--offline",
        ])
        .unwrap();

        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.device_id, "bench-1");
        assert_eq!(config.mqtt.connect_timeout, Duration::from_secs(2));
        assert!(config.offline);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        assert!(parse(&["--source", "x", "--report-threshold", "1.2"]).is_err());
        assert!(parse(&["--source", "x", "--conf=-0.1"]).is_err());
    }

    #[test]
    fn rejects_negative_interval() {
        assert!(parse(&["--source", "x", "--interval=-1"]).is_err());
        assert!(parse(&["--source", "x", "--interval", "NaN"]).is_err());
    }

    #[test]
    fn rejects_bad_input_size() {
        assert!(parse(&["--source", "x", "--input-size", "500"]).is_err());
    }

    #[test]
    fn loop_defaults_match_cli_defaults() {
        let config = parse(&["--source", "x"]).unwrap();
        assert_eq!(config.loop_settings, LoopSettings::default());
    }

    #[test]
    fn help_explains_forced_exit() {
        use clap::CommandFactory;

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("A second signal exits at once"));
    }
}
