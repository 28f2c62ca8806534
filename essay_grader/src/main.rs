mod content;
mod gateway;
mod routes;
mod store;

use crate::content::ContentClient;
use crate::gateway::{ChatCompletionsGateway, RetrievalGateway};
use crate::store::CmsResultStore;
use env_logger::Env;
use log::{error, info};
use scoring::gateway::ModelGateway;
use scoring::store::ResultStore;
use serde::Deserialize;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_redoc::Redoc;
use utoipa_redoc::Servable;

fn get_default_port() -> u16 {
    8080
}

fn get_default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn get_default_request_timeout() -> u64 {
    60
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "get_default_port")]
    port: u16,
    base_url: String,
    openai_api_key: String,
    model: String,
    #[serde(default = "get_default_embedding_model")]
    embedding_model: String,
    reference_corpus: Option<String>,
    cms_base_url: String,
    cms_api_key: String,
    #[serde(default = "get_default_request_timeout")]
    request_timeout: u64,
}

#[derive(Clone)]
pub struct AppState {
    content: Arc<ContentClient>,
    gateway: Arc<dyn ModelGateway>,
    store: Arc<dyn ResultStore>,
}

#[derive(OpenApi)]
#[openapi(info(description = "API for grading law-exam answers with llms"))]
struct ApiDoc;

async fn run() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = envy::from_env::<Config>()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout))
        .build()?;

    let content = Arc::new(ContentClient::new(
        client.clone(),
        config.cms_base_url.clone(),
        config.cms_api_key.clone(),
    ));
    let gateway: Arc<dyn ModelGateway> = match &config.reference_corpus {
        Some(path) => {
            info!("Loading reference corpus from {path}");
            let corpus = std::fs::read_to_string(path)?;
            Arc::new(
                RetrievalGateway::from_corpus(
                    client.clone(),
                    config.base_url.clone(),
                    config.openai_api_key.clone(),
                    config.model.clone(),
                    config.embedding_model.clone(),
                    &corpus,
                )
                .await?,
            )
        }
        None => Arc::new(ChatCompletionsGateway::new(
            client.clone(),
            config.base_url.clone(),
            config.openai_api_key.clone(),
            config.model.clone(),
        )),
    };
    let store = Arc::new(CmsResultStore::new(Arc::clone(&content)));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(routes::grade))
        .routes(routes!(routes::grade_question))
        .routes(routes!(routes::get_result))
        .routes(routes!(routes::get_article))
        .routes(routes!(routes::get_section_articles))
        .routes(routes!(routes::search_articles))
        .split_for_parts();

    info!("Starting on port {}", config.port);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    axum::serve(
        listener,
        router
            .merge(Redoc::with_url("/redoc", api))
            .with_state(AppState {
                content,
                gateway,
                store,
            }),
    )
    .await?;

    Ok(())
}

fn main() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    if let Err(err) = rt.block_on(run()) {
        error!("{}", err);
        exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_vars() -> Vec<(String, String)> {
        vec![
            ("BASE_URL".to_string(), "https://api.openai.com/v1".to_string()),
            ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
            ("MODEL".to_string(), "gpt-4o-mini".to_string()),
            (
                "CMS_BASE_URL".to_string(),
                "https://example.microcms.io/api/v1".to_string(),
            ),
            ("CMS_API_KEY".to_string(), "cms-key".to_string()),
        ]
    }

    #[test]
    fn config_fills_defaults_from_minimal_env() {
        let config = envy::from_iter::<_, Config>(required_vars()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.request_timeout, 60);
        assert!(config.reference_corpus.is_none());
    }

    #[test]
    fn corpus_path_is_optional_and_carried_through() {
        let mut vars = required_vars();
        vars.push((
            "REFERENCE_CORPUS".to_string(),
            "/data/hanrei.txt".to_string(),
        ));
        let config = envy::from_iter::<_, Config>(vars).unwrap();
        assert_eq!(config.reference_corpus.as_deref(), Some("/data/hanrei.txt"));
    }
}
