use common::models::{Article, GradeResult, Grading, Question, ScoringCriterion, Section};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

const API_KEY_HEADER: &str = "X-MICROCMS-API-KEY";

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("no content matching `{0}`")]
    NotFound(String),
    #[error("content api request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client for the headless CMS holding articles, sections and grade records.
/// The CMS's own field names stay inside this module; everything it returns
/// is mapped onto the shared models.
pub struct ContentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    contents: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CriterionDocument {
    item_title: String,
    score: f64,
    scoring_criterion: String,
}

#[derive(Debug, Deserialize)]
struct QuestionDocument {
    #[serde(default)]
    theme: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    scoring_criteria: Vec<CriterionDocument>,
}

#[derive(Debug, Deserialize)]
struct SectionDocument {
    id: String,
    section: String,
    slug: String,
    #[serde(default)]
    description: String,
}

// The sub-question list arrives under the singular key `question`.
#[derive(Debug, Deserialize)]
struct ArticleDocument {
    id: String,
    title: String,
    slug: String,
    #[serde(default)]
    section: Option<SectionDocument>,
    #[serde(default)]
    problem: String,
    #[serde(default)]
    fact: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    comment: String,
    #[serde(default, rename = "question")]
    questions: Vec<QuestionDocument>,
    #[serde(default)]
    scoring_criteria: Vec<CriterionDocument>,
}

#[derive(Debug, Deserialize)]
struct GradeRecordDocument {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    commentary: String,
    #[serde(default)]
    scores: Vec<ScoreItemDocument>,
}

#[derive(Debug, Deserialize)]
struct ScoreItemDocument {
    title: String,
    score: f64,
    #[serde(default, rename = "maxScore")]
    max_score: f64,
    #[serde(default)]
    criterion: String,
    #[serde(default)]
    description: String,
}

impl From<CriterionDocument> for ScoringCriterion {
    fn from(document: CriterionDocument) -> Self {
        ScoringCriterion {
            title: document.item_title,
            max_score: document.score,
            criterion: document.scoring_criterion,
        }
    }
}

impl From<QuestionDocument> for Question {
    fn from(document: QuestionDocument) -> Self {
        Question {
            theme: document.theme,
            question: document.question,
            answer: document.answer,
            comment: document.comment,
            scoring_criteria: document
                .scoring_criteria
                .into_iter()
                .map(ScoringCriterion::from)
                .collect(),
        }
    }
}

impl From<SectionDocument> for Section {
    fn from(document: SectionDocument) -> Self {
        Section {
            id: document.id,
            section: document.section,
            slug: document.slug,
            description: document.description,
        }
    }
}

impl From<ArticleDocument> for Article {
    fn from(document: ArticleDocument) -> Self {
        Article {
            id: document.id,
            title: document.title,
            slug: document.slug,
            section: document.section.map(Section::from),
            problem: document.problem,
            fact: document.fact,
            answer: document.answer,
            comment: document.comment,
            questions: document.questions.into_iter().map(Question::from).collect(),
            scoring_criteria: document
                .scoring_criteria
                .into_iter()
                .map(ScoringCriterion::from)
                .collect(),
        }
    }
}

impl From<GradeRecordDocument> for GradeResult {
    fn from(document: GradeRecordDocument) -> Self {
        GradeResult {
            answer: document.answer,
            grading: document
                .scores
                .into_iter()
                .map(|item| Grading {
                    title: item.title,
                    score: item.score,
                    max_score: item.max_score,
                    criterion: item.criterion,
                    description: item.description,
                })
                .collect(),
            commentary: document.commentary,
        }
    }
}

impl ContentClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        ContentClient {
            client,
            base_url,
            api_key,
        }
    }

    async fn list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ContentError> {
        let listing: Listing<T> = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.contents)
    }

    /// Fetches an article by slug, falling back to treating the reference as
    /// a document id.
    pub async fn get_article(&self, article_ref: &str) -> Result<Article, ContentError> {
        let filter = format!("slug[equals]{article_ref}");
        let matches: Vec<ArticleDocument> = self.list("article", &[("filters", &filter)]).await?;
        if let Some(document) = matches.into_iter().next() {
            return Ok(document.into());
        }
        let filter = format!("id[equals]{article_ref}");
        let matches: Vec<ArticleDocument> = self.list("article", &[("filters", &filter)]).await?;
        matches
            .into_iter()
            .next()
            .map(Article::from)
            .ok_or_else(|| ContentError::NotFound(article_ref.to_string()))
    }

    pub async fn get_section_articles(
        &self,
        section_id: &str,
    ) -> Result<Vec<Article>, ContentError> {
        let filter = format!("section[equals]{section_id}");
        let documents: Vec<ArticleDocument> =
            self.list("article", &[("filters", &filter)]).await?;
        Ok(documents.into_iter().map(Article::from).collect())
    }

    pub async fn search_articles(&self, query: &str) -> Result<Vec<Article>, ContentError> {
        let documents: Vec<ArticleDocument> = self.list("article", &[("q", query)]).await?;
        Ok(documents.into_iter().map(Article::from).collect())
    }

    /// Appends a grade record to the `answers` collection and returns the
    /// generated document id.
    pub async fn create_grade_record(
        &self,
        article_id: &str,
        result: &GradeResult,
    ) -> Result<String, ContentError> {
        let scores: Vec<serde_json::Value> = result
            .grading
            .iter()
            .map(|grading| {
                json!({
                    "fieldId": "scoring_item",
                    "title": grading.title,
                    "score": grading.score,
                    "maxScore": grading.max_score,
                    "criterion": grading.criterion,
                    "description": grading.description,
                })
            })
            .collect();
        let created: CreatedDocument = self
            .client
            .post(format!("{}/answers", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({
                "article": article_id,
                "answer": result.answer,
                "commentary": result.commentary,
                "scores": scores,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created.id)
    }

    pub async fn get_grade_record(&self, record_id: &str) -> Result<GradeResult, ContentError> {
        let filter = format!("id[equals]{record_id}");
        let matches: Vec<GradeRecordDocument> =
            self.list("answers", &[("filters", &filter)]).await?;
        matches
            .into_iter()
            .next()
            .map(GradeResult::from)
            .ok_or_else(|| ContentError::NotFound(record_id.to_string()))
    }
}
