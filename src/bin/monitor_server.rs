//! Monitor server: captures frames from a camera or video file, runs pose
//! detection and behavior analysis, and serves the annotated feed as an
//! MJPEG stream over TCP.
//!
//! The capture/analysis pipeline runs on a dedicated thread; the async side
//! only fans the latest encoded frame out to connected viewers.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use centinela::alert::{FileEvidenceSink, JsonlAlertSink};
use centinela::analysis::BehaviorAnalyzer;
use centinela::camera::{CaptureEvent, FrameSlot, OpenCvCamera};
use centinela::config::Config;
use centinela::pose::{PoseDetector, PoseSource};
use centinela::stream::{jpeg_encode, mjpeg_part};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/monitor_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

// ---------------------------------------------------------------------------
// Capture + analysis thread
// ---------------------------------------------------------------------------

fn run_pipeline(
    config: Config,
    slot: FrameSlot,
    shutdown: Arc<AtomicBool>,
    logfile: LogFile,
) -> Result<()> {
    let mut camera = OpenCvCamera::open(&config.camera)?;
    let mut detector = PoseDetector::new(
        &config.model.path,
        config.model.person_score,
        config.model.keypoint_confidence,
    )?;
    let mut analyzer = BehaviorAnalyzer::new(
        config.analysis.clone(),
        &config.alert,
        &config.camera,
    );
    let mut evidence = FileEvidenceSink::new(&config.alert.evidence_dir)?;
    let mut alert_log = JsonlAlertSink::open(&config.alert.alert_log)?;

    log!(
        logfile,
        "[pipeline] source={} model={} fps_cap={}",
        config.camera.source,
        config.model.path,
        config.camera.target_fps
    );

    let target_interval = Duration::from_secs_f64(1.0 / config.camera.target_fps.max(1) as f64);
    let mut fps_counter: u32 = 0;
    let mut fps_timer = Instant::now();
    let mut last_motion = 0.0f32;

    while !shutdown.load(Ordering::Relaxed) {
        let start = Instant::now();

        let frame = match camera.read_frame() {
            Ok(CaptureEvent::Frame(frame)) => frame,
            Ok(CaptureEvent::Skipped) => {
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            Ok(CaptureEvent::Rewound) => {
                log!(logfile, "[pipeline] source exhausted, rewinding");
                analyzer.reset();
                continue;
            }
            Err(e) => {
                log!(logfile, "[pipeline] capture error: {e:#}");
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
        };

        // A failed inference yields an empty frame, not a dead pipeline
        let detections = match detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                log!(logfile, "[pipeline] inference error: {e:#}");
                Vec::new()
            }
        };

        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        // A bad frame must not take the analysis thread down with it
        let analysis = match analyzer.process_frame(
            &frame,
            detections,
            now_secs,
            &mut evidence,
            &mut alert_log,
        ) {
            Ok(analysis) => analysis,
            Err(e) => {
                log!(logfile, "[pipeline] analysis error: {e:#}");
                continue;
            }
        };

        for alert in &analysis.alerts {
            log!(
                logfile,
                "[alert] {} track={} severity={:?} evidence={:?}",
                alert.label,
                alert.track_id,
                alert.severity,
                alert.evidence_path
            );
        }

        match jpeg_encode(&analysis.annotated, config.stream.jpeg_quality) {
            Ok(jpeg) => slot.publish(Bytes::from(jpeg)),
            Err(e) => log!(logfile, "[pipeline] encode error: {e:#}"),
        }
        last_motion = analysis.motion_level;

        fps_counter += 1;
        if fps_timer.elapsed() >= Duration::from_secs(1) {
            log!(
                logfile,
                "[fps] {} tracks={} motion={:.2}",
                fps_counter,
                analyzer.track_count(),
                last_motion
            );
            fps_counter = 0;
            fps_timer = Instant::now();
        }

        // Hard frame-rate cap
        let elapsed = start.elapsed();
        if elapsed < target_interval {
            std::thread::sleep(target_interval - elapsed);
        }
    }

    log!(logfile, "[pipeline] stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// MJPEG viewer session
// ---------------------------------------------------------------------------

const MJPEG_RESPONSE_HEADER: &str = "HTTP/1.1 200 OK\r\n\
Connection: close\r\n\
Cache-Control: no-cache\r\n\
Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";

async fn serve_viewer(mut stream: TcpStream, slot: FrameSlot) -> Result<()> {
    stream.write_all(MJPEG_RESPONSE_HEADER.as_bytes()).await?;

    let mut last_id = 0u64;
    loop {
        let id = slot.frame_id();
        if id != last_id {
            if let Some(jpeg) = slot.snapshot() {
                stream.write_all(&mjpeg_part(&jpeg)).await?;
                last_id = id;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default("monitor.toml");
    let logfile = open_log_file()?;
    log!(logfile, "Monitor Server ({})", env!("GIT_VERSION"));
    log!(
        logfile,
        "[config] camera={} ({}) listen={} thresholds={}/{}/{}",
        config.camera.name,
        config.camera.location,
        config.stream.listen_addr,
        config.analysis.slow_speed,
        config.analysis.fast_speed,
        config.analysis.robbery_speed
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let slot = FrameSlot::new();
    let listen_addr = config.stream.listen_addr.clone();

    // Pipeline thread
    let pipeline_handle = {
        let slot = slot.clone();
        let shutdown = Arc::clone(&shutdown);
        let logfile = logfile.clone();
        std::thread::spawn(move || {
            if let Err(e) = run_pipeline(config, slot, shutdown, logfile.clone()) {
                log!(logfile, "[pipeline] fatal: {e:#}");
            }
        })
    };

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    log!(logfile, "[stream] listening on {}", listen_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        log!(logfile, "[stream] viewer connected: {}", addr);
                        let slot = slot.clone();
                        let logfile = logfile.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_viewer(stream, slot).await {
                                log!(logfile, "[stream] viewer dropped: {e}");
                            }
                        });
                    }
                    Err(e) => log!(logfile, "[stream] accept error: {e}"),
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }

    log!(logfile, "[main] shutting down");
    let _ = pipeline_handle.join();
    Ok(())
}
