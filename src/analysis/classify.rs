use serde::Serialize;

use crate::config::AnalysisConfig;

use super::track::{Posture, Track};

/// 分類に必要な最小速度サンプル数
const MIN_VELOCITY_SAMPLES: usize = 3;
/// 平均速度・しゃがみ判定に使う直近サンプル数
const SMOOTHING_WINDOW: usize = 5;
/// 直近ウィンドウ内でこの回数以上しゃがみなら「しゃがみ中」
const CROUCH_MIN_COUNT: usize = 3;

/// トラック単位の行動ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorLabel {
    /// 速度サンプル不足
    Initializing,
    Normal,
    /// 走り。単独ではアラート対象外
    FastMovement,
    Suspicious,
    Robbery,
}

impl BehaviorLabel {
    /// 描画色 (BGR)
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            BehaviorLabel::Initializing => (128, 128, 128), // 灰
            BehaviorLabel::Normal => (0, 255, 0),           // 緑
            BehaviorLabel::FastMovement => (0, 255, 255),   // 黄
            BehaviorLabel::Suspicious => (0, 165, 255),     // 橙
            BehaviorLabel::Robbery => (0, 0, 255),          // 赤
        }
    }

    /// アラート対象かどうか
    pub fn is_alert_worthy(&self) -> bool {
        matches!(self, BehaviorLabel::Suspicious | BehaviorLabel::Robbery)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorLabel::Initializing => "initializing",
            BehaviorLabel::Normal => "normal",
            BehaviorLabel::FastMovement => "fast_movement",
            BehaviorLabel::Suspicious => "suspicious",
            BehaviorLabel::Robbery => "robbery",
        }
    }
}

impl std::fmt::Display for BehaviorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分類結果。履歴から毎フレーム再計算され、保存はしない
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: BehaviorLabel,
    /// 描画色 (BGR)
    pub color: (u8, u8, u8),
    /// 直近の平均速度 (ピクセル/フレーム)
    pub avg_speed: f32,
}

/// 速度・姿勢履歴からの規則表分類
///
/// 判定順 (先勝ち):
/// 1. max > robbery_speed、または (avg > fast_speed かつしゃがみ中) → ROBBERY
/// 2. avg > fast_speed → SUSPICIOUS
/// 3. avg > slow_speed → FAST_MOVEMENT
/// 4. それ以外 → NORMAL
pub fn classify(track: &Track, config: &AnalysisConfig) -> Classification {
    if track.velocity_len() < MIN_VELOCITY_SAMPLES {
        return Classification {
            label: BehaviorLabel::Initializing,
            color: BehaviorLabel::Initializing.color(),
            avg_speed: 0.0,
        };
    }

    let velocities: Vec<f32> = track.velocities().collect();
    let recent = &velocities[velocities.len().saturating_sub(SMOOTHING_WINDOW)..];
    let avg_speed = recent.iter().sum::<f32>() / recent.len() as f32;
    let max_speed = velocities.iter().cloned().fold(0.0f32, f32::max);

    let postures: Vec<Posture> = track.postures().collect();
    let recent_postures = &postures[postures.len().saturating_sub(SMOOTHING_WINDOW)..];
    let crouched = recent_postures
        .iter()
        .filter(|p| **p == Posture::Crouched)
        .count()
        >= CROUCH_MIN_COUNT;

    let label = if max_speed > config.robbery_speed
        || (avg_speed > config.fast_speed && crouched)
    {
        BehaviorLabel::Robbery
    } else if avg_speed > config.fast_speed {
        BehaviorLabel::Suspicious
    } else if avg_speed > config.slow_speed {
        BehaviorLabel::FastMovement
    } else {
        BehaviorLabel::Normal
    };

    Classification {
        label,
        color: label.color(),
        avg_speed,
    }
}
