use std::collections::HashMap;

use crate::config::AnalysisConfig;
use crate::pose::Pose;

use super::track::Track;

/// ID採番付きのトラック置き場
///
/// フレーム間の位置インデックス対応に頼らず、IDをキーに保持する。
/// 検出とのマッチングで残らなかったトラックはそのフレームで破棄。
pub struct TrackArena {
    tracks: HashMap<u32, Track>,
    next_id: u32,
    window: usize,
}

/// 検出→トラックのマッチ結果 (検出インデックス, トラックID)
pub type Matches = Vec<(usize, u32)>;

/// 貪欲な最近傍重心マッチング
///
/// 検出を入力順に走査し、未使用トラックのうち重心が最も近いものを
/// 選ぶ。ゲート距離以上は不成立。トラックはID昇順に走査するため
/// 入力順が同じなら結果は決定的。双方向に単射。
pub fn associate(detections: &[Pose], arena: &TrackArena, gating_distance: f32) -> Matches {
    let mut track_ids: Vec<u32> = arena.tracks.keys().copied().collect();
    track_ids.sort_unstable();

    let mut used: Vec<bool> = vec![false; track_ids.len()];
    let mut matches = Vec::new();

    for (det_idx, detection) in detections.iter().enumerate() {
        let (dx, dy) = match detection.centroid() {
            Some(c) => c,
            // 有効キーポイントゼロの検出はマッチ不能
            None => continue,
        };

        let mut best: Option<(usize, f32)> = None;
        for (slot, &track_id) in track_ids.iter().enumerate() {
            if used[slot] {
                continue;
            }
            let (tx, ty) = match arena.tracks[&track_id].centroid() {
                Some(c) => c,
                None => continue,
            };
            let dist = ((dx - tx).powi(2) + (dy - ty).powi(2)).sqrt();
            if dist < gating_distance {
                match best {
                    Some((_, best_dist)) if dist >= best_dist => {}
                    _ => best = Some((slot, dist)),
                }
            }
        }

        if let Some((slot, _)) = best {
            used[slot] = true;
            matches.push((det_idx, track_ids[slot]));
        }
    }

    matches
}

impl TrackArena {
    pub fn new(window: usize) -> Self {
        Self {
            tracks: HashMap::new(),
            next_id: 0,
            window,
        }
    }

    /// 1フレーム分の検出を取り込む
    ///
    /// マッチしたトラックを更新し、余った検出から新トラックを生成、
    /// マッチしなかった既存トラックは破棄する。検出ゼロのフレームは
    /// 「全員退場」とみなし全トラックを落とす (意図された方針)。
    pub fn step(&mut self, detections: Vec<Pose>, config: &AnalysisConfig) {
        let matches = associate(&detections, self, config.gating_distance);

        let mut matched_dets: Vec<bool> = vec![false; detections.len()];
        let mut keep: Vec<u32> = Vec::with_capacity(matches.len());
        for &(det_idx, track_id) in &matches {
            matched_dets[det_idx] = true;
            keep.push(track_id);
        }

        // マッチしなかったトラックを破棄
        self.tracks.retain(|id, _| keep.contains(id));

        let mut matched_map: HashMap<usize, u32> = matches.into_iter().collect();
        for (det_idx, detection) in detections.into_iter().enumerate() {
            if let Some(track_id) = matched_map.remove(&det_idx) {
                if let Some(track) = self.tracks.get_mut(&track_id) {
                    track.update(detection, config.crouch_ratio);
                }
            } else if detection.centroid().is_some() {
                // 重心のある未マッチ検出は新トラックになる
                let id = self.alloc_id();
                let mut track = Track::new(id, self.window);
                track.update(detection, config.crouch_ratio);
                self.tracks.insert(id, track);
            }
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// ストリーム再開時の全破棄。ID採番も0に戻る
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 0;
    }

    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// ID昇順のトラック一覧
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.tracks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::track::tests::torso_pose;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_detections_spawn_tracks() {
        let mut arena = TrackArena::new(8);
        arena.step(
            vec![
                torso_pose((100.0, 100.0), 80.0, 40.0),
                torso_pose((500.0, 100.0), 80.0, 40.0),
            ],
            &config(),
        );
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.ids(), vec![0, 1]);
    }

    #[test]
    fn test_nearby_detection_matches_existing_track() {
        let mut arena = TrackArena::new(8);
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        // 10px 移動した同一人物
        arena.step(vec![torso_pose((110.0, 100.0), 80.0, 40.0)], &config());
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.ids(), vec![0]);
        assert_eq!(arena.get(0).unwrap().velocity_len(), 1);
    }

    #[test]
    fn test_far_detection_spawns_new_identity() {
        let mut arena = TrackArena::new(8);
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        // 重心がゲート距離(150px)を大きく超える検出
        arena.step(vec![torso_pose((400.0, 100.0), 80.0, 40.0)], &config());
        assert_eq!(arena.len(), 1);
        // 旧トラック0は破棄、新IDが振られる
        assert_eq!(arena.ids(), vec![1]);
    }

    #[test]
    fn test_empty_frame_drops_all_tracks() {
        let mut arena = TrackArena::new(8);
        arena.step(
            vec![
                torso_pose((100.0, 100.0), 80.0, 40.0),
                torso_pose((500.0, 100.0), 80.0, 40.0),
            ],
            &config(),
        );
        arena.step(Vec::new(), &config());
        assert!(arena.is_empty());
        // 次の検出は未使用のIDから始まる
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        assert_eq!(arena.ids(), vec![2]);
    }

    #[test]
    fn test_association_is_injective_and_gated() {
        let mut arena = TrackArena::new(8);
        arena.step(
            vec![
                torso_pose((100.0, 100.0), 80.0, 40.0),
                torso_pose((300.0, 100.0), 80.0, 40.0),
                torso_pose((600.0, 100.0), 80.0, 40.0),
            ],
            &config(),
        );

        let detections = vec![
            torso_pose((105.0, 100.0), 80.0, 40.0),
            torso_pose((295.0, 100.0), 80.0, 40.0),
            torso_pose((900.0, 100.0), 80.0, 40.0), // ゲート外
        ];
        let matches = associate(&detections, &arena, config().gating_distance);

        let mut det_seen = std::collections::HashSet::new();
        let mut track_seen = std::collections::HashSet::new();
        for &(det_idx, track_id) in &matches {
            assert!(det_seen.insert(det_idx));
            assert!(track_seen.insert(track_id));
            let (dx, dy) = detections[det_idx].centroid().unwrap();
            let (tx, ty) = arena.get(track_id).unwrap().centroid().unwrap();
            let dist = ((dx - tx).powi(2) + (dy - ty).powi(2)).sqrt();
            assert!(dist < config().gating_distance);
        }
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_detection_without_centroid_cannot_match() {
        let mut arena = TrackArena::new(8);
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        let matches = associate(&[Pose::default()], &arena, config().gating_distance);
        assert!(matches.is_empty());
        // 取り込んでも新トラックにはならない
        arena.step(vec![Pose::default()], &config());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_greedy_takes_nearest_unused_track() {
        let mut arena = TrackArena::new(8);
        arena.step(
            vec![
                torso_pose((100.0, 100.0), 80.0, 40.0),
                torso_pose((160.0, 100.0), 80.0, 40.0),
            ],
            &config(),
        );
        // 最初の検出が両トラックの中間より track1 寄り
        let detections = vec![
            torso_pose((150.0, 100.0), 80.0, 40.0),
            torso_pose((100.0, 100.0), 80.0, 40.0),
        ];
        let matches = associate(&detections, &arena, config().gating_distance);
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_reset_zeroes_identity_counter() {
        let mut arena = TrackArena::new(8);
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        arena.reset();
        assert!(arena.is_empty());
        arena.step(vec![torso_pose((100.0, 100.0), 80.0, 40.0)], &config());
        assert_eq!(arena.ids(), vec![0]);
    }
}
