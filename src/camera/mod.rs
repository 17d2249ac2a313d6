pub mod capture;

pub use capture::{CaptureEvent, FrameSlot, OpenCvCamera};
