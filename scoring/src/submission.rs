use common::models::ScoringCriterion;

/// Everything the grading prompt needs for one answer: the exam material,
/// the reference answer and explanation, the rubric, and the user's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub problem: String,
    pub facts: String,
    pub model_answer: String,
    pub explanation: String,
    pub answer: String,
    pub criteria: Vec<ScoringCriterion>,
}
