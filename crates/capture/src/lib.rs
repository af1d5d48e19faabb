pub mod camera;
pub mod error;
pub mod files;
pub mod frame;
pub mod source;

pub use camera::IpCamera;
pub use error::CaptureError;
pub use files::{FileBatch, IMAGE_EXTENSIONS};
pub use frame::{Frame, FrameOrigin};
pub use source::{Acquired, FrameSource};
