use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One weighted rubric dimension. `criterion` holds the grading guidance
/// the article author wrote for this dimension.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ScoringCriterion {
    pub title: String,
    pub max_score: f64,
    pub criterion: String,
}

/// A sub-question of an article, carrying its own rubric.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Question {
    pub theme: String,
    pub question: String,
    pub answer: String,
    pub comment: String,
    #[serde(default)]
    pub scoring_criteria: Vec<ScoringCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Section {
    pub id: String,
    pub section: String,
    pub slug: String,
    pub description: String,
}

/// An exam article as served by the content store. Content fields the
/// grading flow does not consume are dropped on decode.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub section: Option<Section>,
    pub problem: String,
    pub fact: String,
    pub answer: String,
    pub comment: String,
    pub questions: Vec<Question>,
    pub scoring_criteria: Vec<ScoringCriterion>,
}

/// The graded outcome for a single rubric dimension.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Grading {
    pub title: String,
    pub score: f64,
    pub max_score: f64,
    pub criterion: String,
    pub description: String,
}

/// The outcome of grading one answer. Totals are derived from the entries
/// and never stored separately.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct GradeResult {
    pub answer: String,
    pub grading: Vec<Grading>,
    pub commentary: String,
}

impl GradeResult {
    pub fn total_score(&self) -> f64 {
        self.grading.iter().map(|entry| entry.score).sum()
    }

    pub fn total_max(&self) -> f64 {
        self.grading.iter().map(|entry| entry.max_score).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, score: f64, max_score: f64) -> Grading {
        Grading {
            title: title.to_string(),
            score,
            max_score,
            criterion: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn totals_sum_over_entries() {
        let result = GradeResult {
            answer: "答案".to_string(),
            grading: vec![entry("構成力", 15.0, 20.0), entry("論理性", 18.0, 20.0)],
            commentary: "総評".to_string(),
        };
        assert_eq!(result.total_score(), 33.0);
        assert_eq!(result.total_max(), 40.0);
    }

    #[test]
    fn totals_of_empty_result_are_zero() {
        let result = GradeResult {
            answer: String::new(),
            grading: vec![],
            commentary: String::new(),
        };
        assert_eq!(result.total_score(), 0.0);
        assert_eq!(result.total_max(), 0.0);
    }
}
