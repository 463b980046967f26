//! Composite key resolution
//!
//! Three metric families are produced independently and joined back to the
//! same sample through string keys:
//!
//! | dataset | scanpath / saliency key       | explanation key                 |
//! |---------|-------------------------------|---------------------------------|
//! | AiR-D   | `AiR-D-{question_id}`         | `{question_id}-{subject}`       |
//! | OSIE    | `OSIE-{name}`                 | `{stem}-{subject}`              |
//! | COCO-TP | `COCO-TP-{task}-{name}`       | `TP-{task}-{stem}-{subject}`    |
//! | COCO-TA | `COCO-TA-{task}-{name}`       | `TA-{task}-{stem}-{subject}`    |
//! | COCO-FV | `COCO-FV-{name}`              | none                            |
//!
//! The explanation templates match the keys used by the reference
//! explanation annotations, so they cannot be changed independently.

use crate::dataset::Dataset;
use crate::error::DataError;
use crate::loader::FixationInfo;

/// All keys for one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleKeys {
    pub dataset: Dataset,
    pub scanpath: String,
    pub saliency: String,
    /// `None` for datasets without per-subject explanations
    pub explanation: Option<String>,
}

/// Resolve every key for a sample
pub fn resolve(info: &FixationInfo) -> Result<SampleKeys, DataError> {
    let dataset = info.dataset()?;
    let scanpath = scanpath_key(dataset, info)?;
    Ok(SampleKeys {
        dataset,
        saliency: scanpath.clone(),
        scanpath,
        explanation: explanation_key(dataset, info)?,
    })
}

/// Key joining a prediction to its scanpath ground truth
pub fn resolve_scanpath_key(info: &FixationInfo) -> Result<String, DataError> {
    scanpath_key(info.dataset()?, info)
}

/// Key joining a prediction to the saliency ground truth of its image
pub fn resolve_saliency_key(info: &FixationInfo) -> Result<String, DataError> {
    resolve_scanpath_key(info)
}

/// Key joining a generated explanation to its reference set
pub fn resolve_explanation_key(info: &FixationInfo) -> Result<Option<String>, DataError> {
    explanation_key(info.dataset()?, info)
}

fn scanpath_key(dataset: Dataset, info: &FixationInfo) -> Result<String, DataError> {
    let key = match dataset {
        Dataset::AirD => format!("{}-{}", dataset, question_id(dataset, info)?),
        Dataset::Osie | Dataset::CocoFv => format!("{}-{}", dataset, info.name),
        Dataset::CocoTp | Dataset::CocoTa => {
            format!("{}-{}-{}", dataset, task(dataset, info)?, info.name)
        }
    };
    Ok(key)
}

fn explanation_key(dataset: Dataset, info: &FixationInfo) -> Result<Option<String>, DataError> {
    let key = match dataset {
        Dataset::AirD => format!("{}-{}", question_id(dataset, info)?, info.subject),
        Dataset::Osie => format!("{}-{}", stem(&info.name), info.subject),
        Dataset::CocoTp => format!(
            "TP-{}-{}-{}",
            task(dataset, info)?,
            stem(&info.name),
            info.subject
        ),
        Dataset::CocoTa => format!(
            "TA-{}-{}-{}",
            task(dataset, info)?,
            stem(&info.name),
            info.subject
        ),
        Dataset::CocoFv => return Ok(None),
    };
    Ok(Some(key))
}

fn question_id(dataset: Dataset, info: &FixationInfo) -> Result<String, DataError> {
    info.question_id
        .as_ref()
        .map(|id| id.to_string())
        .ok_or_else(|| DataError::MissingField {
            dataset,
            name: info.name.clone(),
            field: "question_id",
        })
}

fn task(dataset: Dataset, info: &FixationInfo) -> Result<&str, DataError> {
    info.task.as_deref().ok_or_else(|| DataError::MissingField {
        dataset,
        name: info.name.clone(),
        field: "task",
    })
}

/// Image name without its extension
///
/// Splits at the last dot rather than dropping a fixed-width suffix, so
/// `.jpeg` names and names without an extension keep their full stem.
fn stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}
