use anyhow::{Context, Result};
use bytes::Bytes;
use opencv::{core::Mat, prelude::*, videoio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CameraConfig;

/// 1回の読み出し結果
pub enum CaptureEvent {
    Frame(Mat),
    /// 空フレーム。スキップして次を読む
    Skipped,
    /// 動画ファイルが末尾に達し、先頭へ巻き戻した
    Rewound,
}

/// OpenCVキャプチャのラッパ
///
/// ソースはデバイス番号 ("0") または動画ファイルパス。ファイルは
/// 末尾到達で先頭へループする。
pub struct OpenCvCamera {
    capture: videoio::VideoCapture,
    is_file: bool,
}

impl OpenCvCamera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let (capture, is_file) = match config.source.parse::<i32>() {
            Ok(index) => {
                let mut cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)
                    .with_context(|| format!("failed to open camera device {}", index))?;
                cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
                cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
                (cap, false)
            }
            Err(_) => {
                let cap = videoio::VideoCapture::from_file(&config.source, videoio::CAP_ANY)
                    .with_context(|| format!("failed to open video file {}", config.source))?;
                (cap, true)
            }
        };

        if !capture.is_opened()? {
            anyhow::bail!("capture source {} could not be opened", config.source);
        }
        Ok(Self { capture, is_file })
    }

    /// 次のフレームを読む
    ///
    /// ファイルソースで読めなくなったら先頭に巻き戻して Rewound を
    /// 返す。呼び出し側は追跡状態を破棄すること。
    pub fn read_frame(&mut self) -> Result<CaptureEvent> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame)?;

        if grabbed && !frame.empty() {
            return Ok(CaptureEvent::Frame(frame));
        }

        if self.is_file {
            self.capture.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
            return Ok(CaptureEvent::Rewound);
        }
        Ok(CaptureEvent::Skipped)
    }
}

/// 最新エンコード済みフレームの共有スロット
///
/// 処理スレッドが publish し、配信側がフレームIDの変化を見て
/// snapshot する。中間フレームの欠落は許容 (最新のみ保持)。
#[derive(Clone)]
pub struct FrameSlot {
    latest: Arc<Mutex<Option<Bytes>>>,
    frame_id: Arc<AtomicU64>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            frame_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, jpeg: Bytes) {
        // フレームIDは格納に成功したときだけ進める
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(jpeg);
            self.frame_id.fetch_add(1, Ordering::Release);
        }
    }

    pub fn snapshot(&self) -> Option<Bytes> {
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    /// publish のたびに増える通し番号
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}
