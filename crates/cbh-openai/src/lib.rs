//! OpenAI adapter (chart vision analysis).
//!
//! Sends the chart as a base64 `data:` URL to the `chat/completions`
//! endpoint together with the analyst instructions for the user's language.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use cbh_core::{
    config::Config,
    domain::Language,
    errors::{AdapterError, Error},
    formatting::strip_wrapping_fences,
    ports::VisionAnalyzer,
    prompts::analyst_prompt,
    utils::truncate_text,
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenAiVision {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl OpenAiVision {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("reqwest client build: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_tokens,
            http,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(key) = cfg.openai_api_key.as_deref() else {
            return Ok(None);
        };
        Self::new(
            key,
            &cfg.openai_model,
            &cfg.openai_base_url,
            cfg.vision_max_tokens,
            cfg.vision_timeout,
        )
        .map(Some)
    }

    fn request_body(&self, image: &[u8], language: Language) -> serde_json::Value {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": analyst_prompt(language) },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl VisionAnalyzer for OpenAiVision {
    async fn analyze(
        &self,
        image: &[u8],
        language: Language,
    ) -> std::result::Result<String, AdapterError> {
        if self.api_key.trim().is_empty() {
            return Err(AdapterError::ServiceMisconfigured);
        }

        debug!(
            model = %self.model,
            bytes = image.len(),
            language = language.code(),
            "requesting chart analysis"
        );

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image, language))
            .send()
            .await
            .map_err(|e| AdapterError::from_transport(e.is_timeout(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(
                status = status.as_u16(),
                body = %truncate_text(&body, 200),
                "openai returned an error"
            );
            return Err(AdapterError::UpstreamStatus(status.as_u16()));
        }

        let completion: ChatCompletion = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout
            } else {
                AdapterError::InvalidResponse(format!("openai json error: {e}"))
            }
        })?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| strip_wrapping_fences(&c))
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AdapterError::NoData);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer, timeout: Duration) -> OpenAiVision {
        OpenAiVision::new("sk-test", "gpt-4o", server.base_url(), 600, timeout).unwrap()
    }

    #[tokio::test]
    async fn sends_data_url_and_returns_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("data:image/jpeg;base64,/9hpbWc=")
                    .body_contains("\"max_tokens\":600")
                    .body_contains("\"model\":\"gpt-4o\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"choices":[{"message":{"role":"assistant","content":"**Trade Direction:** Buy"}}]}"#);
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        let out = vision
            .analyze(b"\xFF\xD8img", Language::English)
            .await
            .unwrap();

        assert_eq!(out, "**Trade Direction:** Buy");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn chinese_preference_sends_chinese_instructions() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("交易方向");
                then.status(200)
                    .body(r#"{"choices":[{"message":{"content":"ok"}}]}"#);
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert_eq!(
            vision.analyze(b"x", Language::Chinese).await.unwrap(),
            "ok"
        );
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn error_status_maps_to_upstream_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body(r#"{"error":{"message":"rate limited"}}"#);
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert_eq!(
            vision.analyze(b"x", Language::Both).await,
            Err(AdapterError::UpstreamStatus(429))
        );
    }

    #[tokio::test]
    async fn fenced_reply_is_unwrapped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body(
                    r#"{"choices":[{"message":{"content":"```markdown\n**Trade Direction:** Sell\n```\n"}}]}"#,
                );
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert_eq!(
            vision.analyze(b"x", Language::English).await,
            Ok("**Trade Direction:** Sell".to_string())
        );
    }

    #[tokio::test]
    async fn fence_with_nothing_inside_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .body(r#"{"choices":[{"message":{"content":"```\n\n```"}}]}"#);
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert_eq!(
            vision.analyze(b"x", Language::English).await,
            Err(AdapterError::NoData)
        );
    }

    #[tokio::test]
    async fn empty_choices_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body(r#"{"choices":[]}"#);
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert_eq!(
            vision.analyze(b"x", Language::English).await,
            Err(AdapterError::NoData)
        );
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let vision = client(&server, Duration::from_secs(5));
        assert!(matches!(
            vision.analyze(b"x", Language::English).await,
            Err(AdapterError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn slow_upstream_is_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .body(r#"{"choices":[{"message":{"content":"late"}}]}"#);
            })
            .await;

        let vision = client(&server, Duration::from_millis(200));
        assert_eq!(
            vision.analyze(b"x", Language::English).await,
            Err(AdapterError::Timeout)
        );
    }

    #[tokio::test]
    async fn blank_key_is_misconfigured() {
        let vision = OpenAiVision::new(
            " ",
            "gpt-4o",
            "http://127.0.0.1:9",
            600,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            vision.analyze(b"x", Language::English).await,
            Err(AdapterError::ServiceMisconfigured)
        );
    }

    #[test]
    fn absent_key_yields_no_client() {
        let cfg = Config::from_lookup(|k| (k == "BOT_TOKEN").then(|| "t".to_string())).unwrap();
        assert!(OpenAiVision::from_config(&cfg).unwrap().is_none());
    }
}
