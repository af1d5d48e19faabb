pub mod config;
pub mod error;
pub mod inspection;
pub mod metrics;
pub mod pacer;
pub mod persist;
pub mod policy;
pub mod state;
pub mod stats;

pub use config::{Cli, InspectorConfig, LoopSettings, SourceKind};
pub use error::{InspectError, PersistError};
pub use inspection::{InspectionLoop, RunSummary};
pub use pacer::{InterruptiblePacer, Pacer};
pub use persist::{DetectionArchive, detection_filename};
pub use policy::{Defect, DetectionPolicy, Evaluation};
pub use state::{LoopState, RunOutcome, StopReason};
pub use stats::SessionStats;
