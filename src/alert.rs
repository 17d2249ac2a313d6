use anyhow::{Context, Result};
use opencv::core::Mat;
use opencv::imgcodecs;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::analysis::classify::BehaviorLabel;
use crate::analysis::track::Track;

/// アラート深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    /// ラベルに対応する深刻度。アラート対象外は None
    pub fn for_label(label: BehaviorLabel) -> Option<Severity> {
        match label {
            BehaviorLabel::Robbery => Some(Severity::High),
            BehaviorLabel::Suspicious => Some(Severity::Medium),
            _ => None,
        }
    }
}

/// 発報されたアラート。書き込み後は不変
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub label: BehaviorLabel,
    pub severity: Severity,
    /// 発報時刻 (UNIXマイクロ秒)
    pub timestamp_us: u64,
    pub track_id: u32,
    pub camera: String,
    pub location: String,
    /// 証拠画像の保存パス。保存失敗時は None
    pub evidence_path: Option<String>,
}

/// アラート記録の出力先
pub trait AlertSink {
    fn create_alert(&mut self, event: &AlertEvent) -> Result<()>;
}

/// 証拠画像の出力先
pub trait EvidenceSink {
    /// 保存先のフルパスを返す
    fn save_evidence(&mut self, image: &Mat, filename: &str) -> Result<String>;
}

/// 証拠画像のファイル名 (ラベル+時刻+トラックIDで衝突回避)
pub fn evidence_filename(label: BehaviorLabel, timestamp_us: u64, track_id: u32) -> String {
    format!("{}_{}_t{}.jpg", label, timestamp_us, track_id)
}

/// クールダウン付きアラート発報
///
/// ROBBERY / SUSPICIOUS のみ対象。同一トラックは cooldown 秒間
/// 再発報しない。発報時のみ証拠保存と記録作成の副作用が起きる。
pub struct AlertEmitter {
    cooldown_secs: f64,
    camera: String,
    location: String,
}

impl AlertEmitter {
    pub fn new(cooldown_secs: f64, camera: String, location: String) -> Self {
        Self {
            cooldown_secs,
            camera,
            location,
        }
    }

    /// 発報条件を満たせばアラートを出す
    ///
    /// 証拠保存・記録作成の失敗は記録して続行する (処理ループは
    /// 止めない)。証拠保存に失敗したアラート記録は evidence_path =
    /// None で作られ、記録作成に失敗してもイベント自体は返す。
    pub fn maybe_alert(
        &self,
        track: &mut Track,
        label: BehaviorLabel,
        now_secs: f64,
        annotated_frame: &Mat,
        evidence: &mut dyn EvidenceSink,
        sink: &mut dyn AlertSink,
    ) -> Option<AlertEvent> {
        let severity = Severity::for_label(label)?;

        if now_secs - track.last_alert_time < self.cooldown_secs {
            return None;
        }
        track.last_alert_time = now_secs;
        track.alert_count += 1;

        let timestamp_us = (now_secs * 1_000_000.0) as u64;
        let filename = evidence_filename(label, timestamp_us, track.id);
        let evidence_path = match evidence.save_evidence(annotated_frame, &filename) {
            Ok(path) => Some(path),
            Err(e) => {
                eprintln!("[alert] evidence save failed ({}): {:#}", filename, e);
                None
            }
        };

        let event = AlertEvent {
            label,
            severity,
            timestamp_us,
            track_id: track.id,
            camera: self.camera.clone(),
            location: self.location.clone(),
            evidence_path,
        };
        if let Err(e) = sink.create_alert(&event) {
            eprintln!("[alert] record write failed (track {}): {:#}", track.id, e);
        }
        Some(event)
    }
}

/// JPEGファイルとして証拠を書き出す
pub struct FileEvidenceSink {
    dir: PathBuf,
}

impl FileEvidenceSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())
            .with_context(|| format!("failed to create evidence dir {:?}", dir.as_ref()))?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }
}

impl EvidenceSink for FileEvidenceSink {
    fn save_evidence(&mut self, image: &Mat, filename: &str) -> Result<String> {
        let path = self.dir.join(filename);
        let path_str = path.to_string_lossy().to_string();
        let params = opencv::core::Vector::new();
        let ok = imgcodecs::imwrite(&path_str, image, &params)
            .with_context(|| format!("imwrite failed for {}", path_str))?;
        if !ok {
            anyhow::bail!("imwrite returned false for {}", path_str);
        }
        Ok(path_str)
    }
}

/// アラート記録を1行1件のJSONで追記する
pub struct JsonlAlertSink {
    writer: std::io::BufWriter<fs::File>,
}

impl JsonlAlertSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .with_context(|| format!("failed to open alert log {:?}", path.as_ref()))?;
        Ok(Self {
            writer: std::io::BufWriter::new(file),
        })
    }
}

impl AlertSink for JsonlAlertSink {
    fn create_alert(&mut self, event: &AlertEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}
