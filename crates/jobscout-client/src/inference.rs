use std::time::Duration;

use jobscout_core::error::AppError;
use jobscout_core::payload::{CompanyFacts, JobExtraction, ListingDraft, MatchAnalysis};
use jobscout_core::policy::Profile;
use jobscout_core::traits::Inference;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const SYSTEM_PROMPT: &str = "You are a job-market analysis assistant. Answer ONLY with valid JSON matching the requested schema. Do not include explanations.";
/// Company pages arrive as raw HTML; cap what we ship to the model.
const MAX_CONTENT_CHARS: usize = 30_000;

/// OpenAI-compatible inference client.
///
/// Works against any chat-completions endpoint that supports structured
/// output, including OpenAI itself and Gemini's compatibility layer. All
/// three operations are plain request/response calls with no local state,
/// so retrying after a failure is always safe.
#[derive(Clone)]
pub struct OpenAiInference {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiInference {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, model, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.model, &self.base_url, timeout)
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn complete<T: DeserializeOwned>(
        &self,
        schema_name: &str,
        schema: serde_json::Value,
        prompt: String,
    ) -> Result<T, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaWrapper {
                    name: schema_name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::Network(format!("Connection failed: {e}"))
                } else {
                    AppError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            if status_code == 429 {
                return Err(AppError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));
            return Err(AppError::Inference {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("Failed to parse inference response: {e}")))?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| AppError::Inference {
                message: "Empty response from inference backend".into(),
                status_code: 200,
                retryable: false,
            })?;

        parse_content(content)
    }
}

fn parse_content<T: DeserializeOwned>(content: &str) -> Result<T, AppError> {
    serde_json::from_str(content).map_err(|e| {
        AppError::Extraction(format!("inference returned unusable JSON: {e}. Raw: {content}"))
    })
}

fn truncate(content: &str) -> &str {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

impl Inference for OpenAiInference {
    async fn extract(&self, title: &str, description: &str) -> Result<JobExtraction, AppError> {
        let prompt = format!(
            "Extract structured fields from this job posting.\n\nTitle: {title}\n\nDescription:\n{}",
            truncate(description)
        );
        self.complete("job_extraction", extraction_schema(), prompt)
            .await
    }

    async fn analyze(
        &self,
        listing: &ListingDraft,
        extraction: &JobExtraction,
        profile: &Profile,
    ) -> Result<MatchAnalysis, AppError> {
        let prompt = format!(
            "Assess how well this candidate fits this job. Score 0-100.\n\n\
             Candidate profile:\n{}\n\n\
             Job: {} at {}\nExtracted fields:\n{}\n\nDescription:\n{}",
            serde_json::to_string_pretty(profile)?,
            listing.title,
            listing.company_name,
            serde_json::to_string_pretty(extraction)?,
            truncate(&listing.description),
        );
        self.complete("match_analysis", analysis_schema(), prompt)
            .await
    }

    async fn enrich_company(&self, name: &str, content: &str) -> Result<CompanyFacts, AppError> {
        let prompt = format!(
            "Extract facts about the company \"{name}\" from its website content. \
             Use null for anything the content does not support.\n\nContent:\n{}",
            truncate(content)
        );
        self.complete("company_facts", company_schema(), prompt)
            .await
    }
}

// ---- chat-completions wire types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaWrapper,
}

#[derive(Serialize)]
struct JsonSchemaWrapper {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ---- response schemas ----

fn extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "seniority", "work_arrangement", "timezone_offset", "city",
            "salary_min", "salary_max", "experience_min", "experience_max",
            "technologies", "employment_type", "role_category"
        ],
        "properties": {
            "seniority": {"type": ["string", "null"]},
            "work_arrangement": {
                "type": ["string", "null"],
                "enum": ["remote", "hybrid", "onsite", "unknown", null]
            },
            "timezone_offset": {"type": ["integer", "null"]},
            "city": {"type": ["string", "null"]},
            "salary_min": {"type": ["integer", "null"]},
            "salary_max": {"type": ["integer", "null"]},
            "experience_min": {"type": ["integer", "null"]},
            "experience_max": {"type": ["integer", "null"]},
            "technologies": {"type": "array", "items": {"type": "string"}},
            "employment_type": {"type": ["string", "null"]},
            "role_category": {"type": ["string", "null"]}
        }
    })
}

fn analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "match_score", "matched_skills", "missing_skills",
            "key_strengths", "concerns"
        ],
        "properties": {
            "match_score": {"type": "integer", "minimum": 0, "maximum": 100},
            "matched_skills": {"type": "array", "items": {"type": "string"}},
            "missing_skills": {"type": "array", "items": {"type": "string"}},
            "key_strengths": {"type": "array", "items": {"type": "string"}},
            "concerns": {"type": "array", "items": {"type": "string"}}
        }
    })
}

fn company_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "website", "city", "size_estimate", "remote_first",
            "ai_focus", "description", "careers_url"
        ],
        "properties": {
            "website": {"type": ["string", "null"]},
            "city": {"type": ["string", "null"]},
            "size_estimate": {"type": ["integer", "null"]},
            "remote_first": {"type": ["boolean", "null"]},
            "ai_focus": {"type": ["boolean", "null"]},
            "description": {"type": ["string", "null"]},
            "careers_url": {"type": ["string", "null"]}
        }
    })
}
