/// MoveNet の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            _ => None,
        }
    }
}

/// 速度推定に使う体幹キーポイント (肩と腰)
pub const TORSO_KEYPOINTS: [KeypointIndex; 4] = [
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
];

/// 姿勢判定に使うキーポイント (頭 + 肩 + 腰)
pub const POSTURE_KEYPOINTS: [KeypointIndex; 5] = [
    KeypointIndex::Nose,
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
];

/// 単一キーポイント (ピクセル座標)
///
/// 未検出は x <= 0 のセンチネルで表す。検出器は信頼度が閾値未満の
/// キーポイントの座標を0にして出力する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 検出器の信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 検出済みかどうか
    pub fn is_valid(&self) -> bool {
        self.x > 0.0
    }

    pub fn distance_to(&self, other: &Keypoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 有効キーポイントの重心。全滅なら None
    pub fn centroid(&self) -> Option<(f32, f32)> {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut count = 0usize;
        for kp in &self.keypoints {
            if kp.is_valid() {
                sum_x += kp.x;
                sum_y += kp.y;
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        Some((sum_x / count as f32, sum_y / count as f32))
    }

    /// 有効キーポイントの外接矩形 (x_min, y_min, x_max, y_max)
    pub fn bbox(&self) -> Option<(f32, f32, f32, f32)> {
        let mut bounds: Option<(f32, f32, f32, f32)> = None;
        for kp in &self.keypoints {
            if !kp.is_valid() {
                continue;
            }
            bounds = Some(match bounds {
                None => (kp.x, kp.y, kp.x, kp.y),
                Some((x0, y0, x1, y1)) => {
                    (x0.min(kp.x), y0.min(kp.y), x1.max(kp.x), y1.max(kp.y))
                }
            });
        }
        bounds
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_index_count() {
        assert_eq!(KeypointIndex::COUNT, 17);
    }

    #[test]
    fn test_keypoint_index_from_index() {
        assert_eq!(KeypointIndex::from_index(0), Some(KeypointIndex::Nose));
        assert_eq!(KeypointIndex::from_index(16), Some(KeypointIndex::RightAnkle));
        assert_eq!(KeypointIndex::from_index(17), None);
    }

    #[test]
    fn test_keypoint_validity_sentinel() {
        assert!(Keypoint::new(120.0, 80.0, 0.9).is_valid());
        assert!(!Keypoint::new(0.0, 80.0, 0.9).is_valid());
        assert!(!Keypoint::new(-1.0, 80.0, 0.9).is_valid());
    }

    #[test]
    fn test_centroid_ignores_invalid() {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::Nose as usize] = Keypoint::new(100.0, 50.0, 0.9);
        keypoints[KeypointIndex::LeftHip as usize] = Keypoint::new(200.0, 150.0, 0.9);
        let pose = Pose::new(keypoints);
        let (cx, cy) = pose.centroid().unwrap();
        assert_eq!(cx, 150.0);
        assert_eq!(cy, 100.0);
    }

    #[test]
    fn test_centroid_none_when_all_invalid() {
        let pose = Pose::default();
        assert!(pose.centroid().is_none());
        assert!(pose.bbox().is_none());
    }

    #[test]
    fn test_bbox() {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[0] = Keypoint::new(100.0, 50.0, 0.9);
        keypoints[5] = Keypoint::new(80.0, 120.0, 0.9);
        keypoints[11] = Keypoint::new(130.0, 200.0, 0.9);
        let pose = Pose::new(keypoints);
        assert_eq!(pose.bbox().unwrap(), (80.0, 50.0, 130.0, 200.0));
    }
}
