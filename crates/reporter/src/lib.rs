pub mod mqtt;
pub mod payload;
pub mod record;
pub mod session;
pub mod sink;

pub use mqtt::{MqttSettings, MqttSink};
pub use record::{DetectionRecord, StatsSummary};
pub use session::{Session, SystemStatus};
pub use sink::{ReportSink, Reporter, SinkError};
