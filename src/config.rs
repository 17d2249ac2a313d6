use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// キャプチャソース (デバイス番号 "0" または動画ファイルパス)
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// フレームレート上限 (固定スリープで制限)
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// アラート記録に載せるカメラ名
    #[serde(default = "default_camera_name")]
    pub name: String,
    /// 設置場所
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// MoveNet MultiPose ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub path: String,
    /// この信頼度未満のキーポイントは無効扱い (座標を0にする)
    #[serde(default = "default_keypoint_confidence")]
    pub keypoint_confidence: f32,
    /// 人物インスタンスの採用スコア閾値
    #[serde(default = "default_person_score")]
    pub person_score: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// 履歴リングバッファ長 W
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 重心マッチングの最大距離 (ピクセル)
    #[serde(default = "default_gating_distance")]
    pub gating_distance: f32,
    /// これを超えると FAST_MOVEMENT (ピクセル/フレーム)
    #[serde(default = "default_slow_speed")]
    pub slow_speed: f32,
    /// これを超えると SUSPICIOUS
    #[serde(default = "default_fast_speed")]
    pub fast_speed: f32,
    /// 最大速度がこれを超えると ROBBERY
    #[serde(default = "default_robbery_speed")]
    pub robbery_speed: f32,
    /// 高さ/(幅+1) がこれ未満ならしゃがみ姿勢
    #[serde(default = "default_crouch_ratio")]
    pub crouch_ratio: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// 同一トラックの連続アラート抑制間隔 (秒)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    /// 証拠画像の保存先ディレクトリ
    #[serde(default = "default_evidence_dir")]
    pub evidence_dir: String,
    /// アラート記録 (JSON Lines) の出力先
    #[serde(default = "default_alert_log")]
    pub alert_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
}

fn default_source() -> String { "0".to_string() }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_target_fps() -> u32 { 30 }
fn default_camera_name() -> String { "CAM-05".to_string() }
fn default_location() -> String { "Avenida Principal".to_string() }
fn default_model_path() -> String { "models/movenet_multipose.onnx".to_string() }
fn default_keypoint_confidence() -> f32 { 0.3 }
fn default_person_score() -> f32 { 0.3 }
fn default_history_window() -> usize { 8 }
fn default_gating_distance() -> f32 { 150.0 }
fn default_slow_speed() -> f32 { 8.0 }
fn default_fast_speed() -> f32 { 20.0 }
fn default_robbery_speed() -> f32 { 40.0 }
fn default_crouch_ratio() -> f32 { 0.35 }
fn default_cooldown_secs() -> f64 { 2.0 }
fn default_evidence_dir() -> String { "evidence".to_string() }
fn default_alert_log() -> String { "alerts.jsonl".to_string() }
fn default_listen_addr() -> String { "0.0.0.0:8554".to_string() }
fn default_jpeg_quality() -> i32 { 80 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            width: default_width(),
            height: default_height(),
            target_fps: default_target_fps(),
            name: default_camera_name(),
            location: default_location(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            keypoint_confidence: default_keypoint_confidence(),
            person_score: default_person_score(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            gating_distance: default_gating_distance(),
            slow_speed: default_slow_speed(),
            fast_speed: default_fast_speed(),
            robbery_speed: default_robbery_speed(),
            crouch_ratio: default_crouch_ratio(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            evidence_dir: default_evidence_dir(),
            alert_log: default_alert_log(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルがなければデフォルト値で動かす
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(_) => Config::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.history_window, 8);
        assert_eq!(config.analysis.gating_distance, 150.0);
        assert_eq!(config.alert.cooldown_secs, 2.0);
        assert_eq!(config.camera.target_fps, 30);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            robbery_speed = 55.0

            [alert]
            cooldown_secs = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.robbery_speed, 55.0);
        assert_eq!(config.analysis.fast_speed, 20.0);
        assert_eq!(config.alert.cooldown_secs, 5.0);
        assert_eq!(config.alert.evidence_dir, "evidence");
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load_or_default("does_not_exist.toml");
        assert_eq!(config.stream.jpeg_quality, 80);
    }
}
