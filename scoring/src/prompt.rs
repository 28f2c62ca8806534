use askama::Template;
use serde_json::Value;

use crate::schema::{RubricError, RubricKeys};
use crate::submission::Submission;

#[derive(Template)]
#[template(path = "grading_prompt.txt")]
struct GradingPromptTemplate<'a> {
    submission: &'a Submission,
}

/// Grading instruction text plus the output schema the backend has to honor.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingPrompt {
    pub instruction: String,
    pub schema: Value,
}

/// Renders the grading instruction and derives the strict output schema from
/// the submission's rubric. Pure: equal submissions produce equal prompts.
pub fn build_prompt(submission: &Submission) -> Result<GradingPrompt, RubricError> {
    let keys = RubricKeys::for_criteria(&submission.criteria)?;
    let instruction = GradingPromptTemplate { submission }.render()?;
    Ok(GradingPrompt {
        instruction,
        schema: keys.output_schema(),
    })
}
