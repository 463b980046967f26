//! Fixation sequences and the tensor <-> record transformation
//!
//! Models emit fixations as a padded `[batch, max_fixations, 3]` tensor of
//! `(x, y, duration)` rows. Metric adapters consume variable-length records.
//! Coordinates stay in pixel space in both representations.

use crate::error::DataError;
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// Value written into unused fixation slots
///
/// Any row whose x coordinate is negative (or NaN) terminates the sequence.
pub const SENTINEL: f32 = -1.0;

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// One variable-length fixation sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixationRecord {
    /// Horizontal fixation positions (pixels)
    #[serde(rename = "X")]
    pub x: Vec<f32>,
    /// Vertical fixation positions (pixels)
    #[serde(rename = "Y")]
    pub y: Vec<f32>,
    /// Fixation durations
    #[serde(rename = "T")]
    pub t: Vec<f32>,
}

impl FixationRecord {
    /// Number of fixations
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Scale coordinates into `[0, 1]` by the image size
    pub fn normalized(&self, size: ImageSize) -> FixationRecord {
        let width = size.width.max(1) as f32;
        let height = size.height.max(1) as f32;
        FixationRecord {
            x: self.x.iter().map(|x| x / width).collect(),
            y: self.y.iter().map(|y| y / height).collect(),
            t: self.t.clone(),
        }
    }
}

/// Convert a padded fixation tensor into one record per sample
///
/// # Arguments
/// * `batch` - Tensor of shape `[batch, max_fixations, 3]`
///
/// # Returns
/// Sentinel-truncated records, in batch order. The function is pure:
/// identical input always yields identical output.
pub fn transform(batch: ArrayView3<'_, f32>) -> Result<Vec<FixationRecord>, DataError> {
    let (_, _, width) = batch.dim();
    if width != 3 {
        return Err(DataError::ShapeMismatch {
            expected: "[batch, max_fixations, 3]".to_string(),
            actual: batch.shape().to_vec(),
        });
    }

    let records = batch
        .outer_iter()
        .map(|sample| {
            let mut record = FixationRecord::default();
            for row in sample.outer_iter() {
                if row[0].is_nan() || row[0] < 0.0 {
                    break;
                }
                record.x.push(row[0]);
                record.y.push(row[1]);
                record.t.push(row[2]);
            }
            record
        })
        .collect();

    Ok(records)
}

/// Pack records into a `[records.len(), max_fixations, 3]` tensor
///
/// Unused slots are filled with [`SENTINEL`]; sequences longer than
/// `max_fixations` are truncated.
pub fn pad_records(records: &[FixationRecord], max_fixations: usize) -> Array3<f32> {
    let mut tensor = Array3::from_elem((records.len(), max_fixations, 3), SENTINEL);
    for (i, record) in records.iter().enumerate() {
        let fixations = record
            .x
            .iter()
            .zip(&record.y)
            .zip(&record.t)
            .take(max_fixations);
        for (j, ((&x, &y), &t)) in fixations.enumerate() {
            tensor[[i, j, 0]] = x;
            tensor[[i, j, 1]] = y;
            tensor[[i, j, 2]] = t;
        }
    }
    tensor
}
