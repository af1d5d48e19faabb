use crate::{error::CaptureError, frame::Frame};

#[derive(Debug)]
pub enum Acquired {
    Frame(Frame),
    EndOfStream,
}

/// Pull-based producer of frames for a single consumer.
///
/// Implementations must not keep references to frames they hand out.
pub trait FrameSource {
    /// Establish (or re-establish) the underlying connection.
    fn connect(&mut self) -> Result<(), CaptureError>;

    /// Acquire the next frame.
    ///
    /// Errors for which [`CaptureError::is_transient`] is true only cost the
    /// current frame; any other error means the source needs `connect` again.
    fn next_frame(&mut self) -> Result<Acquired, CaptureError>;

    /// True once a finite source has nothing left to hand out.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Release the underlying connection. Idempotent.
    fn release(&mut self) {}

    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<(), CaptureError> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Acquired, CaptureError> {
        (**self).next_frame()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
