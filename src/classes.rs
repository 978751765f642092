//! The fixed class vocabulary the detector can emit (COCO, 80 classes).
//!
//! Class ids reported by a backend index into this table. The vocabulary is
//! closed: the alias resolver and target selector only ever see these labels
//! (or the `class_<id>` fallback for an out-of-range id).

/// Canonical class labels, indexed by detector class id.
pub const CLASS_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Label for a class id, falling back to `class_<id>` for unknown ids.
pub fn label_for(class_id: usize) -> String {
    match CLASS_NAMES.get(class_id) {
        Some(name) => (*name).to_string(),
        None => format!("class_{}", class_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_closed_at_80() {
        assert_eq!(CLASS_NAMES.len(), 80);
        assert_eq!(CLASS_NAMES[0], "person");
        assert_eq!(CLASS_NAMES[79], "toothbrush");
    }

    #[test]
    fn unknown_ids_get_numeric_labels() {
        assert_eq!(label_for(41), "cup");
        assert_eq!(label_for(80), "class_80");
    }
}
