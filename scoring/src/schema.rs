use common::models::ScoringCriterion;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use thiserror::Error;

// encodeURIComponent alphabet: alphanumerics and -_.!~*'() stay as-is.
const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Derives the structural key used for a criterion title in the output
/// schema. The same function is used when reading the backend's output,
/// so the two sides can never disagree on the encoding.
pub fn encode_key(title: &str) -> String {
    utf8_percent_encode(title, KEY_ESCAPES).to_string()
}

#[derive(Error, Debug)]
pub enum RubricError {
    #[error("rubric contains no criteria")]
    EmptyRubric,
    #[error("rubric contains a criterion without a title")]
    UntitledCriterion,
    #[error("duplicate criterion title `{0}`")]
    DuplicateTitle(String),
    #[error("criterion `{title}` has a non-positive weight {max_score}")]
    InvalidWeight { title: String, max_score: f64 },
    #[error("failed to render grading prompt: {0}")]
    Render(#[from] askama::Error),
}

/// Validated rubric keys in criterion order: one `(encoded key, title)`
/// pair per criterion. Both the output schema and the required-field list
/// are derived from this one ordered list.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricKeys {
    keys: Vec<(String, String)>,
}

impl RubricKeys {
    pub fn for_criteria(criteria: &[ScoringCriterion]) -> Result<Self, RubricError> {
        if criteria.is_empty() {
            return Err(RubricError::EmptyRubric);
        }
        let mut keys: Vec<(String, String)> = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            if criterion.title.trim().is_empty() {
                return Err(RubricError::UntitledCriterion);
            }
            if criterion.max_score <= 0.0 {
                return Err(RubricError::InvalidWeight {
                    title: criterion.title.clone(),
                    max_score: criterion.max_score,
                });
            }
            let encoded = encode_key(&criterion.title);
            if keys.iter().any(|(existing, _)| *existing == encoded) {
                return Err(RubricError::DuplicateTitle(criterion.title.clone()));
            }
            keys.push((encoded, criterion.title.clone()));
        }
        Ok(RubricKeys { keys })
    }

    pub fn encoded(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(encoded, _)| encoded.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Builds the strict output schema: one required object per criterion
    /// under `grading`, plus a required top-level `commentary`.
    pub fn output_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for (encoded, _) in &self.keys {
            properties.insert(
                encoded.clone(),
                json!({
                    "type": "object",
                    "properties": {
                        "score": {
                            "type": "number",
                            "description": "この採点項目の得点"
                        },
                        "description": {
                            "type": "string",
                            "description": "この採点項目に対する評価コメント"
                        }
                    },
                    "required": ["score", "description"],
                    "additionalProperties": false
                }),
            );
        }
        let required: Vec<&str> = self.keys.iter().map(|(encoded, _)| encoded.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "grading": {
                    "type": "object",
                    "description": "各採点項目ごとの採点結果",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false
                },
                "commentary": {
                    "type": "string",
                    "description": "総評"
                }
            },
            "required": ["grading", "commentary"],
            "additionalProperties": false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(title: &str, max_score: f64) -> ScoringCriterion {
        ScoringCriterion {
            title: title.to_string(),
            max_score,
            criterion: format!("{title}の採点基準"),
        }
    }

    #[test]
    fn encodes_unreserved_characters_verbatim() {
        assert_eq!(encode_key("abc-DEF_0.9!~*'()"), "abc-DEF_0.9!~*'()");
    }

    #[test]
    fn encodes_spaces_and_multibyte_titles() {
        assert_eq!(encode_key("Legal Analysis"), "Legal%20Analysis");
        assert_eq!(encode_key("構成力"), "%E6%A7%8B%E6%88%90%E5%8A%9B");
    }

    #[test]
    fn keys_preserve_criterion_order() {
        let keys =
            RubricKeys::for_criteria(&[criterion("論理性", 20.0), criterion("構成力", 20.0)])
                .unwrap();
        let encoded: Vec<&str> = keys.encoded().collect();
        assert_eq!(
            encoded,
            vec![
                "%E8%AB%96%E7%90%86%E6%80%A7",
                "%E6%A7%8B%E6%88%90%E5%8A%9B"
            ]
        );
    }

    #[test]
    fn rejects_empty_rubric() {
        assert!(matches!(
            RubricKeys::for_criteria(&[]),
            Err(RubricError::EmptyRubric)
        ));
    }

    #[test]
    fn rejects_blank_title() {
        assert!(matches!(
            RubricKeys::for_criteria(&[criterion("  ", 10.0)]),
            Err(RubricError::UntitledCriterion)
        ));
    }

    #[test]
    fn rejects_duplicate_titles() {
        let result =
            RubricKeys::for_criteria(&[criterion("構成力", 20.0), criterion("構成力", 10.0)]);
        assert!(matches!(result, Err(RubricError::DuplicateTitle(title)) if title == "構成力"));
    }

    #[test]
    fn rejects_non_positive_weight() {
        assert!(matches!(
            RubricKeys::for_criteria(&[criterion("構成力", 0.0)]),
            Err(RubricError::InvalidWeight { .. })
        ));
        assert!(matches!(
            RubricKeys::for_criteria(&[criterion("構成力", -5.0)]),
            Err(RubricError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn schema_requires_every_criterion_and_commentary() {
        let keys = RubricKeys::for_criteria(&[
            criterion("構成力", 20.0),
            criterion("論理性", 20.0),
            criterion("結論", 10.0),
        ])
        .unwrap();
        let schema = keys.output_schema();

        assert_eq!(schema["required"], json!(["grading", "commentary"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["commentary"]["type"], json!("string"));

        let grading = &schema["properties"]["grading"];
        assert_eq!(grading["additionalProperties"], json!(false));
        let properties = grading["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 3);
        let required = grading["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        for encoded in keys.encoded() {
            assert!(required.contains(&json!(encoded)));
            let field = &properties[encoded];
            assert_eq!(field["required"], json!(["score", "description"]));
            assert_eq!(field["additionalProperties"], json!(false));
            assert_eq!(field["properties"]["score"]["type"], json!("number"));
        }
    }
}
