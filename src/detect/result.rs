use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// Raw backend output, in the coordinate space of the image the backend was given.
///
/// Parallel vectors, index-aligned, in model emission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    /// `[x1, y1, x2, y2]` in model-space pixels.
    pub boxes: Vec<[f32; 4]>,
    pub scores: Vec<f32>,
    pub labels: Vec<String>,
}

impl RawDetections {
    pub fn push(&mut self, label: impl Into<String>, score: f32, bbox: [f32; 4]) {
        self.labels.push(label.into());
        self.scores.push(score);
        self.boxes.push(bbox);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub(crate) fn check_aligned(&self) -> Result<()> {
        if self.boxes.len() != self.scores.len() || self.labels.len() != self.scores.len() {
            return Err(VisionError::inference(anyhow::anyhow!(
                "backend output misaligned: {} boxes, {} scores, {} labels",
                self.boxes.len(),
                self.scores.len(),
                self.labels.len()
            )));
        }
        Ok(())
    }
}

/// One detected object, in original-image pixel coordinates.
///
/// Fields are private so a record cannot change after the pipeline produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct DetectionRecord {
    label: String,
    #[serde(rename = "confidence")]
    score: f32,
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

/// Wire shape of a record; decoded records go through `DetectionRecord::new`.
#[derive(Deserialize)]
struct RecordFields {
    label: String,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

impl TryFrom<RecordFields> for DetectionRecord {
    type Error = VisionError;

    fn try_from(fields: RecordFields) -> Result<Self> {
        DetectionRecord::new(fields.label, fields.confidence, fields.bbox)
    }
}

impl DetectionRecord {
    /// Build a record. Rejects scores outside `[0, 1]` and boxes without positive
    /// extent on both axes.
    pub fn new(label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Result<Self> {
        let [x1, y1, x2, y2] = bbox;
        if !(0.0..=1.0).contains(&score) {
            return Err(VisionError::inference(anyhow::anyhow!(
                "score {} outside [0, 1]",
                score
            )));
        }
        if !bbox.iter().all(|v| v.is_finite()) || x1 >= x2 || y1 >= y2 {
            return Err(VisionError::inference(anyhow::anyhow!(
                "degenerate box {:?}",
                bbox
            )));
        }
        Ok(Self {
            label: label.into(),
            score,
            bbox,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    /// `[x1, y1, x2, y2]`.
    pub fn bbox(&self) -> [f32; 4] {
        self.bbox
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    /// Label text as drawn on the overlay.
    pub fn caption(&self) -> String {
        format!("{}: {:.2}", self.label, self.score)
    }
}

/// Ordered results of one inference call.
///
/// Order is model emission order and is preserved through rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    #[serde(skip)]
    image_size: (u32, u32),
    detections: Vec<DetectionRecord>,
}

impl DetectionSet {
    pub fn new(image_size: (u32, u32)) -> Self {
        Self {
            image_size,
            detections: Vec::new(),
        }
    }

    pub fn from_records(image_size: (u32, u32), records: Vec<DetectionRecord>) -> Self {
        Self {
            image_size,
            detections: records,
        }
    }

    pub(crate) fn push(&mut self, record: DetectionRecord) {
        self.detections.push(record);
    }

    /// (width, height) of the source image.
    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DetectionRecord> {
        self.detections.iter()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.detections
    }

    /// Records with `score >= threshold`, in set order.
    pub fn above(&self, threshold: f32) -> impl Iterator<Item = &DetectionRecord> {
        self.iter().filter(move |r| r.score >= threshold)
    }

    /// Per-label counts, ordered by first appearance.
    pub fn label_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for record in self.iter() {
            match counts.iter_mut().find(|(label, _)| label == &record.label) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.label.clone(), 1)),
            }
        }
        counts
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a DetectionRecord;
    type IntoIter = std::slice::Iter<'a, DetectionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
