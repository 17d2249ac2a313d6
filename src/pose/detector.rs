use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::core::Mat;
use opencv::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::preprocess::preprocess_for_multipose;
use super::PoseSource;

/// MoveNet MultiPose を使用した複数人姿勢検出器
pub struct PoseDetector {
    session: Session,
    /// このスコア未満の人物インスタンスは捨てる
    person_score: f32,
    /// この信頼度未満のキーポイントはセンチネル座標 (0,0) にする
    keypoint_confidence: f32,
}

/// MultiPose の最大検出人数
const MAX_INSTANCES: usize = 6;

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        person_score: f32,
        keypoint_confidence: f32,
    ) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            person_score,
            keypoint_confidence,
        })
    }

    /// 前処理済みテンソルから姿勢を検出
    ///
    /// 入力: [1, 256, 256, 3] の i32 テンソル
    /// 出力: [1, 6, 56] — インスタンスごとに 17×(y, x, score) + bbox + スコア
    fn run(&mut self, input: Array4<i32>, frame_w: f32, frame_h: f32) -> Result<Vec<Pose>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .context("Inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs["output_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut poses = Vec::new();

        for i in 0..MAX_INSTANCES {
            let instance_score = output[[0, i, 55]];
            if instance_score < self.person_score {
                continue;
            }

            let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
            for k in 0..KeypointIndex::COUNT {
                let y = output[[0, i, k * 3]];
                let x = output[[0, i, k * 3 + 1]];
                let score = output[[0, i, k * 3 + 2]];

                // 低信頼度キーポイントは未検出扱い (x <= 0 センチネル)
                if score < self.keypoint_confidence {
                    keypoints[k] = Keypoint::new(0.0, 0.0, score);
                } else {
                    keypoints[k] = Keypoint::new(x * frame_w, y * frame_h, score);
                }
            }
            poses.push(Pose::new(keypoints));
        }

        Ok(poses)
    }
}

impl PoseSource for PoseDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Pose>> {
        let frame_w = frame.cols() as f32;
        let frame_h = frame.rows() as f32;
        let input = preprocess_for_multipose(frame)?;
        self.run(input, frame_w, frame_h)
    }
}
