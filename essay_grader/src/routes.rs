use crate::AppState;
use crate::content::ContentError;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::models::{Article, GradeResult, Grading, Question};
use log::{error, warn};
use scoring::gateway::GatewayError;
use scoring::mapper::{MappingError, map_output};
use scoring::prompt::build_prompt;
use scoring::schema::RubricError;
use scoring::store::StoreError;
use scoring::submission::Submission;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GradeRequest {
    pub article: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GradeResponse {
    pub result_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GradeQuestionRequest {
    pub problem: String,
    pub question: Question,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Scorecard {
    pub answer: String,
    pub grading: Vec<Grading>,
    pub commentary: String,
    pub total_score: f64,
    pub total_max: f64,
}

impl From<GradeResult> for Scorecard {
    fn from(result: GradeResult) -> Self {
        let total_score = result.total_score();
        let total_max = result.total_max();
        Scorecard {
            answer: result.answer,
            grading: result.grading,
            commentary: result.commentary,
            total_score,
            total_max,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GradingErrorResponse {
    pub code: u16,
    pub message: &'static str,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Text to look for in the articles' searchable fields.
    pub q: String,
}

type ErrorResponse = (StatusCode, Json<GradingErrorResponse>);

#[derive(Debug, Error)]
enum GradeError {
    #[error(transparent)]
    Rubric(#[from] RubricError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn err_to_response(err: GradeError) -> ErrorResponse {
    match err {
        GradeError::Rubric(e) => {
            error!("invalid scoring rubric: {e}");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(GradingErrorResponse {
                    code: 422,
                    message: "the scoring rubric of this content is invalid",
                }),
            )
        }
        GradeError::Content(ContentError::NotFound(what)) => {
            warn!("article not found: {what}");
            (
                StatusCode::NOT_FOUND,
                Json(GradingErrorResponse {
                    code: 404,
                    message: "article not found",
                }),
            )
        }
        GradeError::Content(e) => {
            error!("error while talking to the content api: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(GradingErrorResponse {
                    code: 502,
                    message: "the content api could not be reached",
                }),
            )
        }
        GradeError::Gateway(GatewayError::Unavailable(e)) => {
            error!("llm backend unavailable: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(GradingErrorResponse {
                    code: 503,
                    message: "the grading backend is currently unavailable",
                }),
            )
        }
        GradeError::Gateway(GatewayError::Refused(e)) => {
            error!("llm backend refused the request: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(GradingErrorResponse {
                    code: 502,
                    message: "the grading backend rejected the request",
                }),
            )
        }
        GradeError::Gateway(GatewayError::MalformedOutput(e)) => {
            error!("llm response did not match the output schema: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GradingErrorResponse {
                    code: 500,
                    message: "grading failed",
                }),
            )
        }
        GradeError::Mapping(e) => {
            error!("llm output could not be mapped onto the rubric: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GradingErrorResponse {
                    code: 500,
                    message: "grading failed",
                }),
            )
        }
        GradeError::Store(StoreError::NotFound(id)) => {
            warn!("grade record not found: {id}");
            (
                StatusCode::NOT_FOUND,
                Json(GradingErrorResponse {
                    code: 404,
                    message: "no result with this id",
                }),
            )
        }
        GradeError::Store(StoreError::Backend(e)) => {
            error!("error while accessing the grade record store: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GradingErrorResponse {
                    code: 500,
                    message: "failed to access the grade record",
                }),
            )
        }
    }
}

async fn grade_submission(
    state: &AppState,
    submission: &Submission,
) -> Result<GradeResult, GradeError> {
    let prompt = build_prompt(submission)?;
    let raw = state.gateway.generate(&prompt).await?;
    Ok(map_output(&raw, submission)?)
}

async fn grade_article(
    state: &AppState,
    article_ref: &str,
    answer: &str,
) -> Result<String, GradeError> {
    let article = state.content.get_article(article_ref).await?;
    let submission = Submission {
        problem: article.problem,
        facts: article.fact,
        model_answer: article.answer,
        explanation: article.comment,
        answer: answer.to_string(),
        criteria: article.scoring_criteria,
    };
    let result = grade_submission(state, &submission).await?;
    Ok(state.store.save(&article.id, &result).await?)
}

// A sub-question carries its own rubric; the parent problem text is kept as
// case context so the model sees what the question refers to.
fn question_submission(request: GradeQuestionRequest) -> Submission {
    let GradeQuestionRequest {
        problem,
        question,
        answer,
    } = request;
    let Question {
        theme,
        question: text,
        answer: model_answer,
        comment,
        scoring_criteria,
    } = question;
    let problem_text = if theme.is_empty() {
        text
    } else {
        format!("{theme}: {text}")
    };
    Submission {
        problem: problem_text,
        facts: problem,
        model_answer,
        explanation: comment,
        answer,
        criteria: scoring_criteria,
    }
}

#[utoipa::path(post, path = "/api/v1/grade", request_body = GradeRequest, responses((status = OK, body = GradeResponse), (status = NOT_FOUND), (status = UNPROCESSABLE_ENTITY), (status = BAD_GATEWAY), (status = SERVICE_UNAVAILABLE), (status = INTERNAL_SERVER_ERROR)), description = "Grade an answer to an article and persist the result")]
#[axum::debug_handler]
pub async fn grade(
    state: State<AppState>,
    body: Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ErrorResponse> {
    let result_id = grade_article(&state, &body.article, &body.answer)
        .await
        .map_err(err_to_response)?;
    Ok(Json(GradeResponse { result_id }))
}

#[utoipa::path(post, path = "/api/v1/grade_question", request_body = GradeQuestionRequest, responses((status = OK, body = Scorecard), (status = UNPROCESSABLE_ENTITY), (status = BAD_GATEWAY), (status = SERVICE_UNAVAILABLE), (status = INTERNAL_SERVER_ERROR)), description = "Grade an answer to a single sub-question without persisting it")]
#[axum::debug_handler]
pub async fn grade_question(
    state: State<AppState>,
    body: Json<GradeQuestionRequest>,
) -> Result<Json<Scorecard>, ErrorResponse> {
    let submission = question_submission(body.0);
    let result = grade_submission(&state, &submission)
        .await
        .map_err(err_to_response)?;
    Ok(Json(Scorecard::from(result)))
}

#[utoipa::path(get, path = "/api/v1/results/{result_id}", params(("result_id" = String, Path, description = "Identifier returned by the grade endpoint")), responses((status = OK, body = Scorecard), (status = NOT_FOUND), (status = INTERNAL_SERVER_ERROR)), description = "Fetch a persisted grading result")]
#[axum::debug_handler]
pub async fn get_result(
    state: State<AppState>,
    result_id: Path<String>,
) -> Result<Json<Scorecard>, ErrorResponse> {
    let result = state
        .store
        .load(&result_id)
        .await
        .map_err(|err| err_to_response(err.into()))?;
    Ok(Json(Scorecard::from(result)))
}

#[utoipa::path(get, path = "/api/v1/articles/{article_ref}", params(("article_ref" = String, Path, description = "Article slug or id")), responses((status = OK, body = Article), (status = NOT_FOUND), (status = BAD_GATEWAY)), description = "Fetch an article by slug or id")]
#[axum::debug_handler]
pub async fn get_article(
    state: State<AppState>,
    article_ref: Path<String>,
) -> Result<Json<Article>, ErrorResponse> {
    let article = state
        .content
        .get_article(&article_ref)
        .await
        .map_err(|err| err_to_response(err.into()))?;
    Ok(Json(article))
}

#[utoipa::path(get, path = "/api/v1/sections/{section_id}/articles", params(("section_id" = String, Path, description = "Section id")), responses((status = OK, body = Vec<Article>), (status = BAD_GATEWAY)), description = "List the articles of a section")]
#[axum::debug_handler]
pub async fn get_section_articles(
    state: State<AppState>,
    section_id: Path<String>,
) -> Result<Json<Vec<Article>>, ErrorResponse> {
    let articles = state
        .content
        .get_section_articles(&section_id)
        .await
        .map_err(|err| err_to_response(err.into()))?;
    Ok(Json(articles))
}

#[utoipa::path(get, path = "/api/v1/search", params(SearchParams), responses((status = OK, body = Vec<Article>), (status = BAD_GATEWAY)), description = "Full text search over articles")]
#[axum::debug_handler]
pub async fn search_articles(
    state: State<AppState>,
    params: Query<SearchParams>,
) -> Result<Json<Vec<Article>>, ErrorResponse> {
    let articles = state
        .content
        .search_articles(&params.q)
        .await
        .map_err(|err| err_to_response(err.into()))?;
    Ok(Json(articles))
}
