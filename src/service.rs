//! Client for the external image-generation service.
//!
//! Two operations are consumed: seamless pattern generation from a text
//! prompt, and subject transformation (isolate on white, add an accessory).
//! Both go through `models/{model}:generateContent` and return the first
//! inline image part of the response. The [`GenerateService`] trait is the
//! seam the processing and state tasks are written against, so tests can
//! substitute a stub without touching the network.

use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::Error;
use crate::state::SubjectOptions;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub trait GenerateService {
    /// Generate a tileable pattern image for the sheet background.
    fn generate_pattern(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// Transform an uploaded photo into a sticker-like cutout.
    fn process_subject(
        &self,
        image: &[u8],
        mime_type: &str,
        options: &SubjectOptions,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client, reading the credential from the configured environment
    /// variable. A missing credential is fatal for every later call, so it is
    /// rejected here rather than retried.
    pub fn new(cfg: &GenerationConfig) -> Result<Self, Error> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| Error::CredentialMissing(cfg.api_key_env.clone()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            model: cfg.model.clone(),
            api_key,
        })
    }

    async fn generate_content(&self, body: serde_json::Value) -> Result<GeneratedImage, Error> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;

        let part = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data);
        match part {
            Some(inline) => {
                let bytes = BASE64
                    .decode(inline.data.as_bytes())
                    .map_err(|e| Error::PatternGeneration(format!("bad inline image data: {e}")))?;
                debug!(
                    mime = %inline.mime_type,
                    bytes = bytes.len(),
                    "generation service returned an image"
                );
                Ok(GeneratedImage { bytes })
            }
            None => Err(Error::PatternGeneration("no image part returned".into())),
        }
    }
}

impl GenerateService for GeminiClient {
    fn generate_pattern(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        let body = json!({
            "contents": [{ "parts": [{ "text": pattern_prompt(prompt) }] }],
            "generationConfig": { "imageConfig": { "aspectRatio": "1:1" } },
        });
        async move {
            self.generate_content(body)
                .await
                .map(|img| img.bytes)
                .map_err(|e| match e {
                    Error::PatternGeneration(_) => e,
                    other => Error::PatternGeneration(other.to_string()),
                })
        }
    }

    fn process_subject(
        &self,
        image: &[u8],
        mime_type: &str,
        options: &SubjectOptions,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send {
        let body = json!({
            "contents": [{ "parts": [
                { "inlineData": { "mimeType": mime_type, "data": BASE64.encode(image) } },
                { "text": subject_prompt(options) },
            ] }],
        });
        async move {
            self.generate_content(body)
                .await
                .map(|img| img.bytes)
                .map_err(|e| Error::SubjectProcessing(e.to_string()))
        }
    }
}

struct GeneratedImage {
    bytes: Vec<u8>,
}

fn pattern_prompt(description: &str) -> String {
    format!(
        "Generate a seamless, tileable wrapping paper pattern. \
         Style: Elegant, high-resolution, vector-style flat design. \
         Content: {description}. \
         Background: Pure white (#FFFFFF) or very light cream. \
         The pattern must be seamlessly repeatable."
    )
}

fn subject_prompt(options: &SubjectOptions) -> String {
    let mut prompt = String::from("Isolate the main subject in the center of the image.");
    if options.remove_background {
        prompt.push_str(" Change the background to pure solid white (#FFFFFF).");
    }
    if options.add_hat {
        prompt.push_str(&format!(
            " Add a festive {} to the subject's head naturally.",
            options.hat_type.label()
        ));
    }
    prompt.push_str(" Ensure high quality, sharp edges, and sticker-like appearance.");
    prompt
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HatType;

    #[test]
    fn subject_prompt_reflects_options() {
        let opts = SubjectOptions {
            add_hat: true,
            hat_type: HatType::ReindeerAntlers,
            remove_background: true,
        };
        let prompt = subject_prompt(&opts);
        assert!(prompt.contains("Reindeer Antlers"));
        assert!(prompt.contains("pure solid white"));

        let plain = subject_prompt(&SubjectOptions {
            add_hat: false,
            hat_type: HatType::SantaHat,
            remove_background: false,
        });
        assert!(!plain.contains("Santa Hat"));
        assert!(!plain.contains("pure solid white"));
    }

    #[test]
    fn response_parsing_finds_inline_image() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                ] }
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let inline = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(BASE64.decode(inline.data.as_bytes()).unwrap().len(), 3);
    }
}
