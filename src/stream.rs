//! Frame annotation and MJPEG framing for the live preview stream.

use anyhow::Result;
use bytes::Bytes;
use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
};

use crate::analysis::pipeline::TrackStatus;
use crate::pose::{KeypointIndex, Pose};

/// COCO 17-keypoint skeleton edges.
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 16] = [
    (KeypointIndex::Nose, KeypointIndex::LeftEye),
    (KeypointIndex::Nose, KeypointIndex::RightEye),
    (KeypointIndex::LeftEye, KeypointIndex::LeftEar),
    (KeypointIndex::RightEye, KeypointIndex::RightEar),
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

fn bgr(color: (u8, u8, u8)) -> Scalar {
    Scalar::new(color.0 as f64, color.1 as f64, color.2 as f64, 0.0)
}

fn draw_skeleton(canvas: &mut Mat, pose: &Pose, color: Scalar) -> Result<()> {
    for (a, b) in SKELETON_CONNECTIONS {
        let ka = pose.get(a);
        let kb = pose.get(b);
        if ka.is_valid() && kb.is_valid() {
            imgproc::line(
                canvas,
                Point::new(ka.x as i32, ka.y as i32),
                Point::new(kb.x as i32, kb.y as i32),
                color,
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }
    }
    for idx in 0..KeypointIndex::COUNT {
        if let Some(idx) = KeypointIndex::from_index(idx) {
            let kp = pose.get(idx);
            if kp.is_valid() {
                imgproc::circle(
                    canvas,
                    Point::new(kp.x as i32, kp.y as i32),
                    3,
                    color,
                    -1,
                    imgproc::LINE_AA,
                    0,
                )?;
            }
        }
    }
    Ok(())
}

/// Draws skeletons, per-track labels and the camera banner on a copy of
/// the frame. The input frame is left untouched.
pub fn annotate_frame(
    frame: &Mat,
    statuses: &[TrackStatus],
    camera: &str,
    location: &str,
) -> Result<Mat> {
    let mut canvas = frame.try_clone()?;

    for status in statuses {
        let color = bgr(status.classification.color);
        draw_skeleton(&mut canvas, &status.pose, color)?;

        if let Some((min_x, min_y, max_x, max_y)) = status.pose.bbox() {
            let rect = Rect::new(
                min_x as i32,
                min_y as i32,
                (max_x - min_x) as i32,
                (max_y - min_y) as i32,
            );
            imgproc::rectangle(&mut canvas, rect, color, 2, imgproc::LINE_AA, 0)?;

            let label = format!(
                "ID {} {} {:.1}px/f",
                status.track_id,
                status.classification.label,
                status.classification.avg_speed
            );
            imgproc::put_text(
                &mut canvas,
                &label,
                Point::new(min_x as i32, (min_y as i32 - 8).max(16)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                color,
                1,
                imgproc::LINE_AA,
                false,
            )?;
        }
    }

    let banner = format!("{} | {}", camera, location);
    imgproc::put_text(
        &mut canvas,
        &banner,
        Point::new(20, 40),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        Scalar::new(0.0, 255.0, 0.0, 0.0),
        2,
        imgproc::LINE_AA,
        false,
    )?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    imgproc::put_text(
        &mut canvas,
        &timestamp,
        Point::new(20, 70),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        Scalar::new(0.0, 255.0, 0.0, 0.0),
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(canvas)
}

/// JPEG encode with the configured quality.
pub fn jpeg_encode(frame: &Mat, quality: i32) -> Result<Vec<u8>> {
    let mut params: Vector<i32> = Vector::new();
    params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
    params.push(quality);
    let mut buffer: Vector<u8> = Vector::new();
    let ok = imgcodecs::imencode(".jpg", frame, &mut buffer, &params)?;
    if !ok {
        anyhow::bail!("jpeg encode failed");
    }
    Ok(buffer.to_vec())
}

/// Wraps one JPEG image as a multipart/x-mixed-replace part.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify::{BehaviorLabel, Classification};
    use crate::analysis::track::tests::torso_pose;
    use opencv::core::CV_8UC3;

    fn black_frame() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_mjpeg_part_framing() {
        let part = mjpeg_part(b"\xff\xd8jpegdata");
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 10\r\n\r\n"));
        assert!(part.ends_with(b"\r\n"));
    }

    #[test]
    fn test_jpeg_encode_produces_soi_marker() {
        let jpeg = jpeg_encode(&black_frame(), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_annotate_does_not_touch_input() {
        let frame = black_frame();
        let statuses = vec![TrackStatus {
            track_id: 0,
            classification: Classification {
                label: BehaviorLabel::Normal,
                color: BehaviorLabel::Normal.color(),
                avg_speed: 2.0,
            },
            pose: torso_pose((100.0, 100.0), 80.0, 40.0),
        }];
        let annotated = annotate_frame(&frame, &statuses, "CAM-05", "Avenida Principal").unwrap();
        assert_eq!(annotated.size().unwrap(), frame.size().unwrap());
        // input stays black
        let sum = opencv::core::sum_elems(&frame).unwrap();
        assert_eq!(sum[0], 0.0);
    }
}
