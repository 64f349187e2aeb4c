//! Detector seam and the adapter the pipeline talks to.
//!
//! A [`Detector`] is an opaque model returning every candidate box in a
//! frame. [`DetectorAdapter`] narrows that to the pipeline's contract: the
//! single highest-confidence detection of the target class above the
//! threshold, or nothing.

use std::collections::BTreeMap;

use refclip_models::Detection;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::tracker::IouTracker;

/// An object detector.
///
/// Implementations must be usable one frame at a time (batch size one).
/// Per-call failures are returned as errors; the adapter turns them into
/// "no detection".
pub trait Detector: Send {
    /// Run inference and return all candidates after suppression.
    fn infer(&mut self, frame: &Frame) -> MediaResult<Vec<Detection>>;

    /// Class-name table, indexed by class id.
    fn class_names(&self) -> &[String];

    /// Detector name for logging.
    fn name(&self) -> &'static str;
}

/// Resolve a class name against the model's class table.
///
/// Exact match first, then case-insensitive. If the name is absent, the
/// explicit `fallback` id is used when configured; otherwise this fails with
/// [`MediaError::UnknownClass`].
pub fn resolve_target_class(
    class_names: &[String],
    name: &str,
    fallback: Option<usize>,
) -> MediaResult<usize> {
    if let Some(id) = class_names.iter().position(|c| c == name) {
        return Ok(id);
    }
    if let Some(id) = class_names
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
    {
        return Ok(id);
    }

    match fallback {
        Some(id) => {
            warn!(
                target_class = name,
                fallback_id = id,
                "Target class not in model class table, using configured fallback id"
            );
            Ok(id)
        }
        None => Err(MediaError::UnknownClass {
            name: name.to_string(),
            available: class_names.to_vec(),
        }),
    }
}

/// Parse an Ultralytics `names` metadata value (`{0: 'person', 1: 'referee'}`).
///
/// Gaps in the id sequence are filled with empty names so the result can be
/// indexed by class id.
pub fn parse_class_names(raw: &str) -> MediaResult<Vec<String>> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let mut by_id = BTreeMap::new();

    for entry in body.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (id, name) = entry.split_once(':').ok_or_else(|| {
            MediaError::model_load(format!("Malformed class name entry: {}", entry))
        })?;
        let id: usize = id
            .trim()
            .trim_matches(|c| c == '\'' || c == '"')
            .parse()
            .map_err(|_| MediaError::model_load(format!("Malformed class id: {}", id)))?;
        let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
        by_id.insert(id, name.to_string());
    }

    let len = by_id.keys().next_back().map(|max| max + 1).unwrap_or(0);
    let mut names = vec![String::new(); len];
    for (id, name) in by_id {
        names[id] = name;
    }
    Ok(names)
}

/// Pick the primary detection: highest confidence, larger box on ties.
pub fn select_primary(candidates: &[Detection]) -> Option<Detection> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.bbox
                        .area()
                        .partial_cmp(&b.bbox.area())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        })
}

/// Adapter exposing the single-detection contract over a [`Detector`].
pub struct DetectorAdapter {
    detector: Box<dyn Detector>,
    tracker: Option<IouTracker>,
}

impl DetectorAdapter {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self {
            detector,
            tracker: None,
        }
    }

    /// Assign track ids to detections with the given tracker.
    pub fn with_tracker(mut self, tracker: IouTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn class_names(&self) -> &[String] {
        self.detector.class_names()
    }

    pub fn name(&self) -> &'static str {
        self.detector.name()
    }

    /// Primary detection for a frame, surfacing inference failures.
    ///
    /// Any error from the underlying detector is reported as
    /// [`MediaError::InferenceFailed`], which is frame-scoped.
    pub fn try_detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        target_class: usize,
    ) -> MediaResult<Option<Detection>> {
        let candidates = self.detector.infer(frame).map_err(|e| match e {
            MediaError::InferenceFailed(_) => e,
            other => MediaError::inference_failed(other.to_string()),
        })?;

        let matching: Vec<Detection> = candidates
            .into_iter()
            .filter(|d| d.class_id == target_class && d.confidence >= confidence_threshold)
            .collect();

        let matching = match self.tracker.as_mut() {
            Some(tracker) => tracker.update(&matching),
            None => matching,
        };

        let primary = select_primary(&matching);
        if let Some(det) = &primary {
            debug!(
                confidence = det.confidence,
                track_id = ?det.track_id,
                candidates = matching.len(),
                "Primary detection selected"
            );
        }
        Ok(primary)
    }

    /// Primary detection for a frame; inference failures become `None`.
    pub fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        target_class: usize,
    ) -> Option<Detection> {
        match self.try_detect(frame, confidence_threshold, target_class) {
            Ok(detection) => detection,
            Err(e) => {
                warn!(detector = self.name(), "Detection failed for frame: {}", e);
                None
            }
        }
    }

    /// Reset per-source state (track identities).
    pub fn reset(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refclip_models::BoundingBox;

    struct ScriptedDetector {
        names: Vec<String>,
        outputs: Vec<MediaResult<Vec<Detection>>>,
    }

    impl Detector for ScriptedDetector {
        fn infer(&mut self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
            if self.outputs.is_empty() {
                Ok(Vec::new())
            } else {
                self.outputs.remove(0)
            }
        }

        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn det(class_id: usize, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(10.0, 10.0, 60.0, 110.0), confidence, class_id)
    }

    fn names() -> Vec<String> {
        vec!["person".to_string(), "referee".to_string()]
    }

    #[test]
    fn test_resolve_target_class() {
        let names = names();
        assert_eq!(resolve_target_class(&names, "referee", None).unwrap(), 1);
        assert_eq!(resolve_target_class(&names, "Referee", None).unwrap(), 1);
        assert!(matches!(
            resolve_target_class(&names, "ball", None),
            Err(MediaError::UnknownClass { .. })
        ));
        assert_eq!(resolve_target_class(&names, "ball", Some(0)).unwrap(), 0);
    }

    #[test]
    fn test_parse_class_names() {
        let names = parse_class_names("{0: 'person', 1: 'referee', 3: \"ball\"}").unwrap();
        assert_eq!(names, vec!["person", "referee", "", "ball"]);
        assert!(parse_class_names("{}").unwrap().is_empty());
        assert!(parse_class_names("{zero: 'person'}").is_err());
    }

    #[test]
    fn test_select_primary_prefers_confidence_then_area() {
        let small = Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.8, 1);
        let large = Detection::new(BoundingBox::new(0.0, 0.0, 20.0, 20.0), 0.8, 1);
        let best = Detection::new(BoundingBox::new(0.0, 0.0, 5.0, 5.0), 0.9, 1);

        assert_eq!(select_primary(&[small, best, large]), Some(best));
        assert_eq!(select_primary(&[small, large]), Some(large));
        assert_eq!(select_primary(&[]), None);
    }

    #[test]
    fn test_adapter_filters_class_and_threshold() {
        let detector = ScriptedDetector {
            names: names(),
            outputs: vec![Ok(vec![det(0, 0.95), det(1, 0.6), det(1, 0.75)])],
        };
        let mut adapter = DetectorAdapter::new(Box::new(detector));
        let frame = Frame::new(4, 4);

        let primary = adapter.detect(&frame, 0.7, 1).unwrap();
        assert_eq!(primary.class_id, 1);
        assert!((primary.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_adapter_absorbs_failures() {
        let detector = ScriptedDetector {
            names: names(),
            outputs: vec![
                Err(MediaError::internal("session lock poisoned")),
                Ok(vec![det(1, 0.9)]),
            ],
        };
        let mut adapter = DetectorAdapter::new(Box::new(detector));
        let frame = Frame::new(4, 4);

        let err = adapter.try_detect(&frame, 0.5, 1).unwrap_err();
        assert!(err.is_frame_scoped());
        assert!(adapter.detect(&frame, 0.5, 1).is_some());
    }

    #[test]
    fn test_adapter_assigns_track_ids() {
        let detector = ScriptedDetector {
            names: names(),
            outputs: vec![Ok(vec![det(1, 0.9)]), Ok(vec![det(1, 0.9)])],
        };
        let mut adapter =
            DetectorAdapter::new(Box::new(detector)).with_tracker(IouTracker::default());
        let frame = Frame::new(4, 4);

        let first = adapter.detect(&frame, 0.5, 1).unwrap();
        let second = adapter.detect(&frame, 0.5, 1).unwrap();
        assert_eq!(first.track_id, Some(1));
        assert_eq!(second.track_id, Some(1));
    }
}
