use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    video,
};

/// Farnebackオプティカルフローによるフレーム全体の動き量推定
///
/// 動き量 = フロー長の平均。最初のフレームは 0
pub struct MotionEstimator {
    prev_gray: Option<Mat>,
}

impl MotionEstimator {
    pub fn new() -> Self {
        Self { prev_gray: None }
    }

    pub fn process(&mut self, frame: &Mat) -> Result<f32> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let prev = match self.prev_gray.take() {
            Some(prev) => prev,
            None => {
                self.prev_gray = Some(gray);
                return Ok(0.0);
            }
        };

        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(&prev, &gray, &mut flow, 0.5, 3, 15, 3, 5, 1.2, 0)?;

        let mut channels = core::Vector::<Mat>::new();
        core::split(&flow, &mut channels)?;
        let mut magnitude = Mat::default();
        let mut angle = Mat::default();
        core::cart_to_polar(
            &channels.get(0)?,
            &channels.get(1)?,
            &mut magnitude,
            &mut angle,
            false,
        )?;
        let mean = core::mean(&magnitude, &core::no_array())?;

        self.prev_gray = Some(gray);
        Ok(mean[0] as f32)
    }

    pub fn reset(&mut self) {
        self.prev_gray = None;
    }
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new()
    }
}
