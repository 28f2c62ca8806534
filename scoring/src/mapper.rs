use std::collections::HashMap;

use common::models::{GradeResult, Grading};
use serde::Deserialize;
use thiserror::Error;

use crate::schema::encode_key;
use crate::submission::Submission;

/// Decoded structured output of one grading call. Transient: lives only
/// between the backend response and the assembled `GradeResult`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelOutput {
    pub grading: HashMap<String, CriterionOutput>,
    pub commentary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriterionOutput {
    pub score: f64,
    pub description: Option<String>,
}

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("backend output is not valid grading JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("backend output is missing criterion `{0}`")]
    MissingCriterion(String),
    #[error("criterion `{title}` scored {score}, outside 0..={max_score}")]
    ScoreOutOfRange {
        title: String,
        score: f64,
        max_score: f64,
    },
}

/// Validates raw structured output against the submission's rubric and
/// assembles the grade. Criteria are walked in submission order and looked
/// up under the same encoded keys the schema was built with. A missing
/// criterion or an out-of-range score discards the whole attempt; scores are
/// never clamped.
pub fn map_output(raw: &str, submission: &Submission) -> Result<GradeResult, MappingError> {
    let output: ModelOutput = serde_json::from_str(raw)?;
    let mut grading = Vec::with_capacity(submission.criteria.len());
    for criterion in &submission.criteria {
        let entry = output
            .grading
            .get(&encode_key(&criterion.title))
            .ok_or_else(|| MappingError::MissingCriterion(criterion.title.clone()))?;
        if entry.score < 0.0 || entry.score > criterion.max_score {
            return Err(MappingError::ScoreOutOfRange {
                title: criterion.title.clone(),
                score: entry.score,
                max_score: criterion.max_score,
            });
        }
        grading.push(Grading {
            title: criterion.title.clone(),
            score: entry.score,
            max_score: criterion.max_score,
            criterion: criterion.criterion.clone(),
            description: entry
                .description
                .clone()
                .unwrap_or_else(|| criterion.criterion.clone()),
        });
    }
    Ok(GradeResult {
        answer: submission.answer.clone(),
        grading,
        commentary: output.commentary,
    })
}
