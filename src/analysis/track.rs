use std::collections::VecDeque;

use crate::pose::{Pose, POSTURE_KEYPOINTS, TORSO_KEYPOINTS};

/// 1フレームごとの粗い姿勢ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Normal,
    /// しゃがみ (外接矩形の縦横比が閾値未満)
    Crouched,
    /// 有効キーポイント不足で判定不能
    Unknown,
}

/// 1人分の追跡状態
///
/// 連続フレームにわたる同一人物の履歴を持つ。マッチしなかった
/// フレームで即座に破棄される (猶予なし、再同定なし)。
#[derive(Debug)]
pub struct Track {
    /// 生成時に採番される単調増加ID。生存中は不変
    pub id: u32,
    /// キーポイント集合の履歴 (最新が末尾、容量Wのリング)
    position_history: VecDeque<Pose>,
    /// フレーム間スカラー速度の履歴 (ピクセル/フレーム)
    velocity_history: VecDeque<f32>,
    /// 姿勢ラベルの履歴
    posture_history: VecDeque<Posture>,
    /// 最後にアラートを出した時刻 (UNIX秒)。未発報は -inf
    pub last_alert_time: f64,
    pub alert_count: u32,
    window: usize,
}

impl Track {
    pub fn new(id: u32, window: usize) -> Self {
        Self {
            id,
            position_history: VecDeque::with_capacity(window),
            velocity_history: VecDeque::with_capacity(window),
            posture_history: VecDeque::with_capacity(window),
            last_alert_time: f64::NEG_INFINITY,
            alert_count: 0,
            window,
        }
    }

    /// マッチしたフレームごとに1回呼ぶ
    ///
    /// 1. 姿勢を履歴に追加 (満杯なら最古を追い出す)
    /// 2. 履歴が2つ以上なら体幹キーポイントの平均変位を速度として追加
    /// 3. 頭+肩+腰から姿勢ラベルを判定して追加
    pub fn update(&mut self, pose: Pose, crouch_ratio: f32) {
        if self.position_history.len() == self.window {
            self.position_history.pop_front();
        }
        self.position_history.push_back(pose);

        if self.position_history.len() >= 2 {
            let velocity = self.compute_velocity();
            if self.velocity_history.len() == self.window {
                self.velocity_history.pop_front();
            }
            self.velocity_history.push_back(velocity);
        }

        let posture = self.compute_posture(crouch_ratio);
        if self.posture_history.len() == self.window {
            self.posture_history.pop_front();
        }
        self.posture_history.push_back(posture);
    }

    /// 直近2フレーム間の体幹キーポイント平均変位
    ///
    /// 両フレームで有効なペアのみ数える。有効ペアがなければ 0
    fn compute_velocity(&self) -> f32 {
        let len = self.position_history.len();
        let latest = &self.position_history[len - 1];
        let previous = &self.position_history[len - 2];

        let mut sum = 0.0;
        let mut count = 0usize;
        for idx in TORSO_KEYPOINTS {
            let current = latest.get(idx);
            let prev = previous.get(idx);
            if current.is_valid() && prev.is_valid() {
                sum += current.distance_to(prev);
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// 頭+肩+腰の外接矩形から姿勢を判定
    ///
    /// 有効点が3未満なら Unknown。ratio = 高さ/(幅+1) が閾値未満なら
    /// Crouched (+1 はゼロ除算回避)
    fn compute_posture(&self, crouch_ratio: f32) -> Posture {
        let latest = match self.position_history.back() {
            Some(pose) => pose,
            None => return Posture::Unknown,
        };

        let mut xs: Vec<f32> = Vec::with_capacity(POSTURE_KEYPOINTS.len());
        let mut ys: Vec<f32> = Vec::with_capacity(POSTURE_KEYPOINTS.len());
        for idx in POSTURE_KEYPOINTS {
            let kp = latest.get(idx);
            if kp.is_valid() {
                xs.push(kp.x);
                ys.push(kp.y);
            }
        }
        if xs.len() < 3 {
            return Posture::Unknown;
        }

        let width = xs.iter().cloned().fold(f32::MIN, f32::max)
            - xs.iter().cloned().fold(f32::MAX, f32::min);
        let height = ys.iter().cloned().fold(f32::MIN, f32::max)
            - ys.iter().cloned().fold(f32::MAX, f32::min);
        let ratio = height / (width + 1.0);

        if ratio < crouch_ratio {
            Posture::Crouched
        } else {
            Posture::Normal
        }
    }

    /// 最新キーポイント集合の有効重心 (マッチング基準)
    pub fn centroid(&self) -> Option<(f32, f32)> {
        self.position_history.back().and_then(|p| p.centroid())
    }

    pub fn latest_pose(&self) -> Option<&Pose> {
        self.position_history.back()
    }

    pub fn velocities(&self) -> impl Iterator<Item = f32> + '_ {
        self.velocity_history.iter().copied()
    }

    pub fn velocity_len(&self) -> usize {
        self.velocity_history.len()
    }

    pub fn postures(&self) -> impl Iterator<Item = Posture> + '_ {
        self.posture_history.iter().copied()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex};

    /// 体幹と鼻だけ埋めたテスト用Pose
    pub(crate) fn torso_pose(origin: (f32, f32), torso_h: f32, torso_w: f32) -> Pose {
        let (x, y) = origin;
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::Nose as usize] = Keypoint::new(x + torso_w / 2.0, y - 20.0, 0.9);
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::new(x, y, 0.9);
        keypoints[KeypointIndex::RightShoulder as usize] = Keypoint::new(x + torso_w, y, 0.9);
        keypoints[KeypointIndex::LeftHip as usize] = Keypoint::new(x, y + torso_h, 0.9);
        keypoints[KeypointIndex::RightHip as usize] = Keypoint::new(x + torso_w, y + torso_h, 0.9);
        Pose::new(keypoints)
    }

    #[test]
    fn test_first_update_has_no_velocity() {
        let mut track = Track::new(0, 8);
        track.update(torso_pose((100.0, 100.0), 80.0, 40.0), 0.35);
        assert_eq!(track.velocity_len(), 0);
        assert_eq!(track.postures().count(), 1);
    }

    #[test]
    fn test_velocity_is_mean_torso_displacement() {
        let mut track = Track::new(0, 8);
        track.update(torso_pose((100.0, 100.0), 80.0, 40.0), 0.35);
        // 全体幹キーポイントが (10, 0) 移動
        track.update(torso_pose((110.0, 100.0), 80.0, 40.0), 0.35);
        let velocity = track.velocities().last().unwrap();
        assert!((velocity - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_velocity_zero_without_valid_pairs() {
        let mut track = Track::new(0, 8);
        track.update(torso_pose((100.0, 100.0), 80.0, 40.0), 0.35);
        // 2フレーム目は全キーポイント未検出
        track.update(Pose::default(), 0.35);
        let velocity = track.velocities().last().unwrap();
        assert_eq!(velocity, 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut track = Track::new(0, 4);
        for i in 0..10 {
            track.update(torso_pose((100.0 + i as f32, 100.0), 80.0, 40.0), 0.35);
        }
        assert_eq!(track.velocity_len(), 4);
        assert_eq!(track.postures().count(), 4);
    }

    #[test]
    fn test_posture_upright() {
        let mut track = Track::new(0, 8);
        // 高さ100 / (幅40+1) ≈ 2.4 → Normal
        track.update(torso_pose((100.0, 100.0), 80.0, 40.0), 0.35);
        assert_eq!(track.postures().last().unwrap(), Posture::Normal);
    }

    #[test]
    fn test_posture_crouched() {
        let mut track = Track::new(0, 8);
        // 高さ30 / (幅100+1) ≈ 0.3 → Crouched
        track.update(torso_pose((100.0, 100.0), 10.0, 100.0), 0.35);
        assert_eq!(track.postures().last().unwrap(), Posture::Crouched);
    }

    #[test]
    fn test_posture_unknown_with_few_valid_points() {
        let mut track = Track::new(0, 8);
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        // 姿勢判定対象のうち有効なのは2点のみ
        keypoints[KeypointIndex::Nose as usize] = Keypoint::new(100.0, 50.0, 0.9);
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::new(90.0, 80.0, 0.9);
        track.update(Pose::new(keypoints), 0.35);
        assert_eq!(track.postures().last().unwrap(), Posture::Unknown);
    }

    #[test]
    fn test_centroid_tracks_latest_pose() {
        let mut track = Track::new(0, 8);
        track.update(torso_pose((100.0, 100.0), 80.0, 40.0), 0.35);
        track.update(torso_pose((200.0, 100.0), 80.0, 40.0), 0.35);
        let (cx, _) = track.centroid().unwrap();
        assert!(cx > 150.0);
    }
}
