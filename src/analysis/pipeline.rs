use anyhow::Result;
use opencv::core::Mat;

use crate::alert::{AlertEmitter, AlertEvent, AlertSink, EvidenceSink};
use crate::config::{AlertConfig, AnalysisConfig, CameraConfig};
use crate::pose::Pose;
use crate::stream;

use super::associate::TrackArena;
use super::classify::{classify, Classification};
use super::motion::MotionEstimator;

/// トラック1本分のフレーム内状態
#[derive(Debug, Clone)]
pub struct TrackStatus {
    pub track_id: u32,
    pub classification: Classification,
    pub pose: Pose,
}

/// 1フレーム処理の結果
pub struct FrameAnalysis {
    /// ID昇順のトラック状態
    pub statuses: Vec<TrackStatus>,
    /// このフレームで発報されたアラート
    pub alerts: Vec<AlertEvent>,
    /// 描画済みフレーム (配信・証拠共用)
    pub annotated: Mat,
    /// フレーム全体のオプティカルフロー動き量
    pub motion_level: f32,
}

/// 検出結果を追跡・分類・発報につなぐフレーム処理本体
///
/// 検出器は持たない。呼び出し側が検出済みのキーポイント集合を
/// 渡すことで、推論とフレーム処理を分けてテストできる。
pub struct BehaviorAnalyzer {
    arena: TrackArena,
    analysis: AnalysisConfig,
    emitter: AlertEmitter,
    motion: MotionEstimator,
    camera: String,
    location: String,
}

impl BehaviorAnalyzer {
    pub fn new(analysis: AnalysisConfig, alert: &AlertConfig, camera: &CameraConfig) -> Self {
        Self {
            arena: TrackArena::new(analysis.history_window),
            emitter: AlertEmitter::new(
                alert.cooldown_secs,
                camera.name.clone(),
                camera.location.clone(),
            ),
            motion: MotionEstimator::new(),
            camera: camera.name.clone(),
            location: camera.location.clone(),
            analysis,
        }
    }

    /// 1フレーム分の処理
    ///
    /// 追跡更新 → 分類 → 描画 → 発報判定の順。証拠画像には
    /// 描画済みフレームを使う。
    pub fn process_frame(
        &mut self,
        frame: &Mat,
        detections: Vec<Pose>,
        now_secs: f64,
        evidence: &mut dyn EvidenceSink,
        sink: &mut dyn AlertSink,
    ) -> Result<FrameAnalysis> {
        let motion_level = self.motion.process(frame)?;
        self.arena.step(detections, &self.analysis);

        let mut statuses = Vec::with_capacity(self.arena.len());
        for id in self.arena.ids() {
            if let Some(track) = self.arena.get(id) {
                let pose = match track.latest_pose() {
                    Some(pose) => pose.clone(),
                    None => continue,
                };
                statuses.push(TrackStatus {
                    track_id: id,
                    classification: classify(track, &self.analysis),
                    pose,
                });
            }
        }

        let annotated = stream::annotate_frame(frame, &statuses, &self.camera, &self.location)?;

        let mut alerts = Vec::new();
        for status in &statuses {
            if !status.classification.label.is_alert_worthy() {
                continue;
            }
            if let Some(track) = self.arena.get_mut(status.track_id) {
                if let Some(event) = self.emitter.maybe_alert(
                    track,
                    status.classification.label,
                    now_secs,
                    &annotated,
                    evidence,
                    sink,
                ) {
                    alerts.push(event);
                }
            }
        }

        Ok(FrameAnalysis {
            statuses,
            alerts,
            annotated,
            motion_level,
        })
    }

    /// ストリーム再開時の全状態破棄。トラックIDも0から振り直す
    pub fn reset(&mut self) {
        self.arena.reset();
        self.motion.reset();
    }

    pub fn track_count(&self) -> usize {
        self.arena.len()
    }
}
