use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{parse_extraction, AiError, AiExtraction, AiExtractor};

const SYSTEM_PROMPT: &str = "\
You extract patient demographics from OCR text of scanned clinical documents. \
Reply with a single JSON object and nothing else. Use these keys, omitting any \
you cannot find: first_name, last_name, date_of_birth, gender, phone, email, \
address, city, state, zip_code, referring_physician, referring_facility, \
referral_reason. Add a key confidence between 0 and 1 for the whole answer. \
Never guess a value that is not in the text.";

/// Ollama-backed extractor talking to `/api/generate`.
pub struct OllamaExtractor {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaExtractor {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, AiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AiError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, e: reqwest::Error) -> AiError {
        if e.is_connect() {
            AiError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            AiError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            AiError::HttpClient(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    format: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

fn build_prompt(text: &str) -> String {
    format!("Document text:\n\"\"\"\n{text}\n\"\"\"")
}

impl AiExtractor for OllamaExtractor {
    fn extract(&self, text: &str) -> Result<AiExtraction, AiError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = build_prompt(text);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            system: SYSTEM_PROMPT,
            format: "json",
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AiError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| AiError::ResponseParsing(e.to_string()))?;

        let extraction = parse_extraction(&parsed.response)?;
        tracing::debug!(
            model = %self.model,
            confidence = extraction.confidence,
            "AI extraction returned"
        );
        Ok(extraction)
    }
}
