pub mod associate;
pub mod classify;
pub mod motion;
pub mod pipeline;
pub mod track;

pub use associate::{associate, TrackArena};
pub use classify::{classify, BehaviorLabel, Classification};
pub use motion::MotionEstimator;
pub use pipeline::{BehaviorAnalyzer, FrameAnalysis, TrackStatus};
pub use track::{Posture, Track};
