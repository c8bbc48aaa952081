//! COCO class vocabulary as emitted by DETR checkpoints.
//!
//! Index is the model's class id. Unused ids carry "N/A"; the trailing "no object"
//! logit is not part of this table.

pub const COCO_LABELS: [&str; 91] = [
    "N/A",
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
    "N/A",
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
    "N/A",
    "backpack",
    "umbrella",
    "N/A",
    "N/A",
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
    "N/A",
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
    "N/A",
    "dining table",
    "N/A",
    "N/A",
    "toilet",
    "N/A",
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
    "N/A",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Label for a class id; ids past the table get a synthetic `LABEL_<id>` name.
pub fn label_for(id: usize) -> String {
    COCO_LABELS
        .get(id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("LABEL_{}", id))
}

/// Distinct, usable class names (no "N/A" placeholders).
pub fn class_names() -> Vec<String> {
    COCO_LABELS
        .iter()
        .filter(|name| **name != "N/A")
        .map(|name| name.to_string())
        .collect()
}
