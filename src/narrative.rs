//! Qualitative district summary from a chat-completion endpoint

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::census_api::{with_retry, RetryPolicy};
use crate::error::{RankError, Result};
use crate::report::{DistrictReport, Highlight};

pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a demographer. Describe a U.S. congressional district \
in plain language using only the ranked survey measures provided. Mention notable strengths \
and weaknesses relative to other districts. Do not invent figures.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// System and user messages describing a report's displayed rows
pub fn build_messages(report: &DistrictReport) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "District: {}\nRanks are out of {} districts ({}); 1 is the highest value.\n\n",
        report.district, report.total_districts, report.scope
    );
    for row in report.displayed_rows() {
        let flag = match row.highlight {
            Highlight::Top => " [top 10]",
            Highlight::Bottom => " [bottom 10]",
            Highlight::Neutral => "",
        };
        prompt.push_str(&format!(
            "- {} / {}: {}% (rank {}){}\n",
            row.category, row.measure, row.value, row.rank, flag
        ));
    }
    prompt.push_str("\nWrite a short qualitative narrative about this district.");

    vec![ChatMessage::new("system", SYSTEM_PROMPT), ChatMessage::new("user", prompt)]
}

/// Pull the first choice's text out of a completion body
pub fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .ok_or_else(|| RankError::RemoteFetch {
            attempts: 1,
            reason: "completion returned no choices".to_string(),
        })
}

pub struct NarrativeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl NarrativeClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RankError::Configuration(
                "an API key is required for narratives".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RankError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            policy,
        })
    }

    pub async fn narrate(&self, report: &DistrictReport) -> Result<String> {
        let messages = build_messages(report);
        let url = format!("{}/chat/completions", self.base_url);
        info!("Requesting narrative for {} from {}", report.district, self.model);

        let body = with_retry(self.policy, "Chat completion", |_| {
            let request = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&ChatRequest { model: &self.model, messages: &messages, temperature: 0.3 });
            async move {
                let response = request.send().await.map_err(|e| e.to_string())?;
                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(format!("status {} - {}", status, text));
                }
                response.text().await.map_err(|e| e.to_string())
            }
        })
        .await?;
        parse_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankScope;
    use crate::report::ReportRow;

    fn report() -> DistrictReport {
        let row = |code: &str, measure: &str, value, rank, highlight| ReportRow {
            code: code.to_string(),
            category: "EMPLOYMENT STATUS".to_string(),
            measure: measure.to_string(),
            value,
            rank,
            highlight,
        };
        DistrictReport {
            district: "NY-12".to_string(),
            key: None,
            scope: RankScope::National,
            total_districts: 437,
            rows: vec![
                row("A", "Percent in labor force", 71, 4, Highlight::Top),
                row("B", "Median earnings", 90000, 2, Highlight::Top),
                row("C", "Percent unemployed", 3, 430, Highlight::Bottom),
            ],
            skipped_variables: Vec::new(),
        }
    }

    #[test]
    fn test_messages_use_displayed_rows() {
        let messages = build_messages(&report());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let user = &messages[1].content;
        assert!(user.contains("District: NY-12"));
        assert!(user.contains("out of 437 districts (nationwide)"));
        assert!(user.contains("Percent in labor force: 71% (rank 4) [top 10]"));
        assert!(user.contains("Percent unemployed: 3% (rank 430) [bottom 10]"));
        assert!(!user.contains("Median earnings"));
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  A dense urban district. "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "A dense urban district.");
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn test_client_requires_key() {
        let err = NarrativeClient::new(
            DEFAULT_LLM_URL,
            " ".to_string(),
            DEFAULT_MODEL,
            Duration::from_secs(5),
            RetryPolicy::default(),
        );
        assert!(matches!(err, Err(RankError::Configuration(_))));
    }
}
