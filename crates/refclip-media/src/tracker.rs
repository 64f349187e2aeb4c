//! IoU-based tracker assigning stable identities to detections.
//!
//! Greedy matching by Intersection over Union between consecutive frames,
//! highest-confidence detections matched first.

use std::collections::HashMap;

use refclip_models::{BoundingBox, Detection};

#[derive(Debug, Clone)]
struct Track {
    /// Last matched box
    bbox: BoundingBox,
    /// Frames since the last match
    age: u32,
}

/// Simple IoU tracker.
#[derive(Debug)]
pub struct IouTracker {
    iou_threshold: f32,
    max_gap: u32,
    tracks: HashMap<u32, Track>,
    next_track_id: u32,
}

impl IouTracker {
    /// Create a tracker.
    ///
    /// # Arguments
    /// * `iou_threshold` - Minimum IoU for a detection to continue a track
    /// * `max_gap` - Frames a track survives without a match
    pub fn new(iou_threshold: f32, max_gap: u32) -> Self {
        Self {
            iou_threshold,
            max_gap,
            tracks: HashMap::new(),
            next_track_id: 1,
        }
    }

    /// Assign track ids to one frame's detections.
    ///
    /// Returns the detections in input order with `track_id` set.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Detection> {
        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| {
            detections[b]
                .confidence
                .partial_cmp(&detections[a].confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut unmatched_tracks: Vec<u32> = self.tracks.keys().copied().collect();
        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];

        for det_idx in order {
            let bbox = &detections[det_idx].bbox;
            let mut best_iou = self.iou_threshold;
            let mut best_track = None;

            for &track_id in &unmatched_tracks {
                if let Some(track) = self.tracks.get(&track_id) {
                    let iou = bbox.iou(&track.bbox);
                    if iou > best_iou {
                        best_iou = iou;
                        best_track = Some(track_id);
                    }
                }
            }

            let track_id = match best_track {
                Some(id) => {
                    unmatched_tracks.retain(|&t| t != id);
                    id
                }
                None => {
                    let id = self.next_track_id;
                    self.next_track_id += 1;
                    id
                }
            };

            self.tracks.insert(
                track_id,
                Track {
                    bbox: *bbox,
                    age: 0,
                },
            );
            assigned[det_idx] = Some(track_id);
        }

        // Age tracks that found no detection this frame
        for track_id in unmatched_tracks {
            let expired = match self.tracks.get_mut(&track_id) {
                Some(track) => {
                    track.age += 1;
                    track.age > self.max_gap
                }
                None => false,
            };
            if expired {
                self.tracks.remove(&track_id);
            }
        }

        detections
            .iter()
            .zip(assigned)
            .map(|(det, id)| match id {
                Some(id) => det.with_track_id(id),
                None => *det,
            })
            .collect()
    }

    /// Forget all tracks. Called between source videos.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_track_id = 1;
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(0.3, 30)
    }
}
