//! Target selection policies.
//!
//! Given one frame's detections, pick the single box the camera should
//! follow. Face mode wants the most prominent person; object mode wants the
//! best match for a user-named target, ranking matches by a joint
//! prominence/certainty score so a confidently-detected mid-size object
//! beats a barely-confident large one.

use serde::Serialize;

use crate::detect::{BoundingBox, Detection};

use super::alias::{normalize, AliasTable};

/// Coarse distance estimate derived from box area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceBand {
    Close,
    Medium,
    Far,
}

impl DistanceBand {
    /// Band boundaries are exclusive upward: 0.15 is medium, 0.05 is far.
    pub fn from_area(area: f32) -> Self {
        if area > 0.15 {
            DistanceBand::Close
        } else if area > 0.05 {
            DistanceBand::Medium
        } else {
            DistanceBand::Far
        }
    }
}

/// Selection outcome. A miss is a normal result, not an error; it
/// serializes as `{detected:false, x:0, y:0}`.
#[derive(Clone, Debug, Serialize)]
pub struct FoundTarget {
    pub detected: bool,
    pub x: f32,
    pub y: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<DistanceBand>,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl FoundTarget {
    pub fn miss() -> Self {
        Self {
            detected: false,
            x: 0.0,
            y: 0.0,
            distance: None,
            class_label: None,
            confidence: None,
            bbox: None,
        }
    }

    fn face(detection: &Detection) -> Self {
        Self {
            detected: true,
            x: detection.x,
            y: detection.y,
            distance: Some(DistanceBand::from_area(detection.area)),
            class_label: None,
            confidence: Some(detection.confidence),
            bbox: Some(detection.bbox),
        }
    }

    fn object(detection: &Detection) -> Self {
        Self {
            detected: true,
            x: detection.x,
            y: detection.y,
            distance: None,
            class_label: Some(detection.class_label.clone()),
            confidence: Some(detection.confidence),
            bbox: Some(detection.bbox),
        }
    }
}

/// Face policy: the largest person in frame (closest to the camera),
/// first-seen winning area ties.
pub fn select_face(detections: &[Detection]) -> FoundTarget {
    let mut best: Option<&Detection> = None;
    for detection in detections.iter().filter(|d| d.class_label == "person") {
        match best {
            Some(current) if detection.area <= current.area => {}
            _ => best = Some(detection),
        }
    }

    match best {
        Some(detection) => FoundTarget::face(detection),
        None => FoundTarget::miss(),
    }
}

/// Object policy: resolve the term to candidate labels, match detections by
/// exact candidate membership or raw substring containment, and keep the
/// match with the highest `area * confidence`. Both match kinds compete on
/// equal footing; first-seen wins score ties.
pub fn select_object(detections: &[Detection], term: &str, aliases: &AliasTable) -> FoundTarget {
    let normalized = normalize(term);
    let candidates = aliases.resolve(term);

    let mut best: Option<(&Detection, f32)> = None;
    for detection in detections {
        let class_lower = detection.class_label.to_lowercase();
        let matched =
            candidates.iter().any(|c| *c == class_lower) || class_lower.contains(&normalized);
        if !matched {
            continue;
        }

        let score = detection.area * detection.confidence;
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((detection, score)),
        }
    }

    match best {
        Some((detection, _)) => FoundTarget::object(detection),
        None => FoundTarget::miss(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn detection(class_label: &str, area: f32, confidence: f32) -> Detection {
        let side = area.sqrt();
        Detection {
            class_label: class_label.to_string(),
            confidence,
            x: 0.1,
            y: -0.2,
            width: side,
            height: side,
            area,
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: side,
                y2: side,
            },
        }
    }

    #[test]
    fn face_picks_largest_person() {
        let detections = vec![
            detection("person", 0.02, 0.9),
            detection("person", 0.2, 0.6),
            detection("person", 0.08, 0.95),
            detection("cup", 0.5, 0.99),
        ];
        let found = select_face(&detections);
        assert!(found.detected);
        assert_eq!(found.distance, Some(DistanceBand::Close));
        assert_eq!(found.confidence, Some(0.6));
    }

    #[test]
    fn face_without_persons_is_a_miss() {
        let detections = vec![detection("cup", 0.5, 0.99)];
        let found = select_face(&detections);
        assert!(!found.detected);
        assert_eq!(found.x, 0.0);
        assert_eq!(found.y, 0.0);
    }

    #[test]
    fn distance_band_boundaries_are_exclusive() {
        assert_eq!(DistanceBand::from_area(0.16), DistanceBand::Close);
        assert_eq!(DistanceBand::from_area(0.15), DistanceBand::Medium);
        assert_eq!(DistanceBand::from_area(0.06), DistanceBand::Medium);
        assert_eq!(DistanceBand::from_area(0.05), DistanceBand::Far);
        assert_eq!(DistanceBand::from_area(0.01), DistanceBand::Far);
    }

    #[test]
    fn object_ranks_by_joint_score() {
        let aliases = AliasTable::builtin();
        // Joint scores: 0.1 * 0.9 = 0.09 beats 0.3 * 0.2 = 0.06.
        let detections = vec![
            detection("cup", 0.1, 0.9),
            detection("cup", 0.3, 0.2),
        ];
        let found = select_object(&detections, "cup", &aliases);
        assert!(found.detected);
        assert_eq!(found.confidence, Some(0.9));
    }

    #[test]
    fn object_matches_through_aliases() {
        let aliases = AliasTable::builtin();
        let detections = vec![detection("cell phone", 0.05, 0.8)];
        let found = select_object(&detections, "phone", &aliases);
        assert!(found.detected);
        assert_eq!(found.class_label.as_deref(), Some("cell phone"));
    }

    #[test]
    fn object_matches_by_substring() {
        let aliases = AliasTable::builtin();
        // "dog" is not an alias for "hot dog", but substring containment
        // still makes it eligible.
        let detections = vec![detection("hot dog", 0.05, 0.8)];
        let found = select_object(&detections, "dog", &aliases);
        assert!(found.detected);
        assert_eq!(found.class_label.as_deref(), Some("hot dog"));
    }

    #[test]
    fn unknown_term_matches_nothing() {
        let aliases = AliasTable::builtin();
        let detections = vec![
            detection("person", 0.2, 0.9),
            detection("cup", 0.1, 0.9),
        ];
        let found = select_object(&detections, "widget", &aliases);
        assert!(!found.detected);
    }
}
