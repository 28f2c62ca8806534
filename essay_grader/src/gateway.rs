use async_trait::async_trait;
use scoring::gateway::{GatewayError, ModelGateway};
use scoring::prompt::GradingPrompt;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

// Character cap on text sent to the embeddings endpoint.
const EMBED_INPUT_LIMIT: usize = 8000;
const RETRIEVED_PASSAGES: usize = 3;

async fn structured_completion(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    instruction: &str,
    schema: &Value,
) -> Result<String, GatewayError> {
    let response = client
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&json!({
            "model": model,
            "messages": vec![json!({"role": "user", "content": instruction})],
            "temperature": 0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "scoring",
                    "strict": true,
                    "schema": schema,
                },
            },
        }))
        .send()
        .await
        .map_err(|e| GatewayError::Unavailable(e.to_string()))?
        .error_for_status()
        .map_err(|e| GatewayError::Refused(e.to_string()))?;

    let body = response
        .json::<Value>()
        .await
        .map_err(|e| GatewayError::MalformedOutput(e.to_string()))?;
    match body["choices"][0]["message"]["content"].as_str() {
        Some(content) => Ok(content.to_string()),
        None => Err(GatewayError::MalformedOutput(
            "choices[0].message.content not found".to_string(),
        )),
    }
}

/// Structured-completion gateway against an OpenAI-compatible chat API.
pub struct ChatCompletionsGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsGateway {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        ChatCompletionsGateway {
            client,
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ModelGateway for ChatCompletionsGateway {
    async fn generate(&self, prompt: &GradingPrompt) -> Result<String, GatewayError> {
        structured_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            &prompt.instruction,
            &prompt.schema,
        )
        .await
    }
}

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("reference corpus contains no passages")]
    Empty,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingListing {
    data: Vec<EmbeddingItem>,
}

struct Passage {
    text: String,
    embedding: Vec<f32>,
}

/// Retrieval-augmented gateway: grounds each grading call in the passages of
/// a reference corpus (statute text, commentary) most similar to the prompt.
pub struct RetrievalGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    passages: Vec<Passage>,
}

impl RetrievalGateway {
    /// Splits and embeds the corpus up front. Fails when the corpus holds no
    /// passages or the embeddings endpoint cannot be used.
    pub async fn from_corpus(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
        embedding_model: String,
        corpus: &str,
    ) -> Result<Self, CorpusError> {
        let texts = split_passages(corpus);
        if texts.is_empty() {
            return Err(CorpusError::Empty);
        }
        let mut gateway = RetrievalGateway {
            client,
            base_url,
            api_key,
            model,
            embedding_model,
            passages: Vec::new(),
        };
        let embeddings = gateway.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(GatewayError::MalformedOutput(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            ))
            .into());
        }
        gateway.passages = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| Passage { text, embedding })
            .collect();
        Ok(gateway)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.embedding_model,
                "input": inputs,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::Refused(e.to_string()))?;
        let listing = response
            .json::<EmbeddingListing>()
            .await
            .map_err(|e| GatewayError::MalformedOutput(e.to_string()))?;
        Ok(listing.data.into_iter().map(|item| item.embedding).collect())
    }

    fn retrieve(&self, query_embedding: &[f32]) -> Vec<&str> {
        let mut ranked: Vec<(usize, f32)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(index, passage)| {
                (index, cosine_similarity(query_embedding, &passage.embedding))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(RETRIEVED_PASSAGES)
            .map(|(index, _)| self.passages[index].text.as_str())
            .collect()
    }
}

#[async_trait]
impl ModelGateway for RetrievalGateway {
    async fn generate(&self, prompt: &GradingPrompt) -> Result<String, GatewayError> {
        let mut query = prompt.instruction.as_str();
        if let Some((limit, _)) = query.char_indices().nth(EMBED_INPUT_LIMIT) {
            query = &query[..limit];
        }
        let embeddings = self.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings.first().ok_or_else(|| {
            GatewayError::MalformedOutput("empty embedding response".to_string())
        })?;

        let mut instruction = String::from("【参考資料】\n");
        for passage in self.retrieve(query_embedding) {
            instruction.push_str(passage);
            instruction.push('\n');
        }
        instruction.push('\n');
        instruction.push_str(&prompt.instruction);

        structured_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.model,
            &instruction,
            &prompt.schema,
        )
        .await
    }
}

/// Splits a plain-text corpus into retrieval passages at blank lines.
fn split_passages(corpus: &str) -> Vec<String> {
    corpus
        .split("\n\n")
        .map(str::trim)
        .filter(|passage| !passage.is_empty())
        .map(str::to_string)
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::ScoringCriterion;
    use scoring::prompt::build_prompt;
    use scoring::submission::Submission;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> GradingPrompt {
        build_prompt(&Submission {
            problem: "甲の罪責を論ぜよ。".to_string(),
            facts: "甲は乙の財物を持ち去った。".to_string(),
            model_answer: "窃盗罪が成立する。".to_string(),
            explanation: "占有の有無が問われる。".to_string(),
            answer: "窃盗罪が成立すると考える。".to_string(),
            criteria: vec![ScoringCriterion {
                title: "構成力".to_string(),
                max_score: 20.0,
                criterion: "答案の構成が論理的であるか".to_string(),
            }],
        })
        .unwrap()
    }

    fn chat_response(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    fn chat_gateway(base_url: String) -> ChatCompletionsGateway {
        ChatCompletionsGateway::new(
            reqwest::Client::new(),
            base_url,
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
        )
    }

    #[tokio::test]
    async fn sends_the_strict_schema_and_extracts_the_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "temperature": 0,
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {"name": "scoring", "strict": true}
                }
            })))
            .and(body_string_contains("【採点基準】"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_response("{\"grading\":{}}")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let raw = chat_gateway(server.uri()).generate(&prompt()).await.unwrap();
        assert_eq!(raw, "{\"grading\":{}}");
    }

    #[tokio::test]
    async fn error_status_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = chat_gateway(server.uri()).generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Refused(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let err = chat_gateway("http://127.0.0.1:1".to_string())
            .generate(&prompt())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn missing_message_content_is_malformed_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = chat_gateway(server.uri()).generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn retrieval_grounds_the_call_in_similar_passages() {
        let server = MockServer::start().await;
        // First embeddings call covers the corpus, the second the query.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [1.0, 0.0]},
                    {"embedding": [0.0, 1.0]}
                ]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0, 0.1]}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("【参考資料】"))
            .and(body_string_contains("他人の財物を窃取した者は"))
            .and(body_string_contains("【採点基準】"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("{}")))
            .expect(1)
            .mount(&server)
            .await;

        let corpus = "第二百三十五条 他人の財物を窃取した者は、窃盗の罪とし、十年以下の拘禁刑又は五十万円以下の罰金に処する。\n\n第一条 私権は、公共の福祉に適合しなければならない。";
        let gateway = RetrievalGateway::from_corpus(
            reqwest::Client::new(),
            server.uri(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            "text-embedding-3-small".to_string(),
            corpus,
        )
        .await
        .unwrap();

        let raw = gateway.generate(&prompt()).await.unwrap();
        assert_eq!(raw, "{}");
    }

    #[tokio::test]
    async fn empty_corpus_is_rejected_at_startup() {
        let err = RetrievalGateway::from_corpus(
            reqwest::Client::new(),
            "http://127.0.0.1:1".to_string(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            "text-embedding-3-small".to_string(),
            "\n\n   \n\n",
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, CorpusError::Empty));
    }

    #[test]
    fn corpus_splits_on_blank_lines() {
        let passages = split_passages("第一条 条文その一。\n\n\n第二条 条文その二。\n\n");
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0], "第一条 条文その一。");
        assert_eq!(passages[1], "第二条 条文その二。");
    }

    #[test]
    fn cosine_similarity_ranks_aligned_vectors_first() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
