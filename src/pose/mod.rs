pub mod detector;
pub mod keypoint;
pub mod preprocess;

pub use detector::PoseDetector;
pub use keypoint::{Keypoint, KeypointIndex, Pose, POSTURE_KEYPOINTS, TORSO_KEYPOINTS};
pub use preprocess::preprocess_for_multipose;

use anyhow::Result;
use opencv::core::Mat;

/// フレームから人物姿勢の集合を返す検出器の抽象
///
/// 1フレームにつき0人以上。リトライはしない。
pub trait PoseSource {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Pose>>;
}
