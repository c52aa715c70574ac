use std::env;
use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgb, RgbImage};
use pawpress_contracts::context::{ImageRef, SessionContext};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Binary asset returned by the generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Asset {
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, instruction: &str, refs: &[ImageRef]) -> Result<Asset>;
}

pub trait CaptionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn caption(&self, asset: &Asset, context: &SessionContext) -> Result<String>;
}

/// Best-effort enrichment: callers treat any failure as "use the input
/// unchanged" and never propagate it.
pub trait PromptOptimizer: Send + Sync {
    fn name(&self) -> &str;
    fn optimize(&self, raw_theme: &str) -> Result<String>;
}

/// The three collaborators a page run needs, bundled so the scheduler and
/// pipeline borrow one set.
pub struct CollaboratorSet {
    pub generator: Box<dyn GenerationProvider>,
    pub captioner: Box<dyn CaptionProvider>,
    pub optimizer: Box<dyn PromptOptimizer>,
}

impl std::fmt::Debug for CollaboratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorSet").finish_non_exhaustive()
    }
}

impl CollaboratorSet {
    pub fn dryrun() -> Self {
        Self {
            generator: Box::new(DryrunProvider),
            captioner: Box::new(DryrunCaptioner),
            optimizer: Box::new(DryrunOptimizer),
        }
    }

    pub fn studio() -> Result<Self> {
        let config = StudioConfig::from_env()?;
        Ok(Self {
            generator: Box::new(StudioProvider::new(config.clone())),
            captioner: Box::new(StudioCaptioner::new(config.clone())),
            optimizer: Box::new(StudioOptimizer::new(config)),
        })
    }

    pub fn for_provider(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dryrun" => Ok(Self::dryrun()),
            "studio" => Self::studio(),
            other => bail!("unknown provider '{other}' (expected dryrun or studio)"),
        }
    }
}

/// Offline placeholder collaborators. The generator synthesizes a small PNG
/// deterministically from the instruction text, so runs work with no
/// network and identical inputs yield identical bytes.
pub struct DryrunProvider;

impl GenerationProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, instruction: &str, refs: &[ImageRef]) -> Result<Asset> {
        let mut hasher = Sha256::new();
        hasher.update(instruction.as_bytes());
        for image_ref in refs {
            hasher.update(image_ref.path.as_bytes());
        }
        let digest = hasher.finalize();

        let width = 96u32;
        let height = 128u32;
        let image = RgbImage::from_fn(width, height, |x, y| {
            let band = digest[((x / 12 + y / 16) as usize) % digest.len()];
            if (x + y) % 9 == 0 {
                Rgb([20, 20, 20])
            } else {
                Rgb([band.wrapping_add(64), band.wrapping_add(128), band])
            }
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .context("dryrun placeholder PNG encode failed")?;
        Ok(Asset {
            bytes,
            mime_type: "image/png".to_string(),
        })
    }
}

pub struct DryrunCaptioner;

impl CaptionProvider for DryrunCaptioner {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn caption(&self, _asset: &Asset, context: &SessionContext) -> Result<String> {
        let mut caption = format!("A one-of-a-kind page starring {}", context.display_name());
        if let Some(handle) = context
            .handle
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            caption.push_str(&format!(" ({handle})"));
        }
        caption.push('!');
        Ok(caption)
    }
}

pub struct DryrunOptimizer;

impl PromptOptimizer for DryrunOptimizer {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn optimize(&self, raw_theme: &str) -> Result<String> {
        Ok(format!(
            "{raw_theme}, with playful supporting details and a clear focal point"
        ))
    }
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    api_base: String,
    api_key: String,
    image_model: String,
    text_model: String,
}

impl StudioConfig {
    pub fn from_env() -> Result<Self> {
        let Some(api_key) = non_empty_env("STUDIO_API_KEY") else {
            bail!("STUDIO_API_KEY not set");
        };
        Ok(Self {
            api_base: non_empty_env("STUDIO_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            image_model: non_empty_env("STUDIO_IMAGE_MODEL")
                .unwrap_or_else(|| "gpt-image-1".to_string()),
            text_model: non_empty_env("STUDIO_TEXT_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }

    fn http_client() -> HttpClient {
        HttpClient::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default()
    }
}

/// HTTP generation collaborator against an OpenAI-style images endpoint.
/// Text-only requests use the generations route; requests with auxiliary
/// images go through the multipart edits route so the service sees the
/// reference photos.
pub struct StudioProvider {
    config: StudioConfig,
    http: HttpClient,
}

impl StudioProvider {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            config,
            http: StudioConfig::http_client(),
        }
    }

    fn generate_once(&self, instruction: &str, refs: &[ImageRef]) -> Result<Asset> {
        let response = if refs.is_empty() {
            let payload = json!({
                "model": self.config.image_model,
                "prompt": instruction,
                "size": "1024x1536",
                "n": 1,
            });
            self.http
                .post(format!("{}/v1/images/generations", self.config.api_base))
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .context("studio image request failed")?
        } else {
            let mut form = MultipartForm::new()
                .text("model", self.config.image_model.clone())
                .text("prompt", instruction.to_string())
                .text("size", "1024x1536".to_string());
            for image_ref in refs {
                let bytes = fs::read(&image_ref.path)
                    .with_context(|| format!("failed reading {}", image_ref.path))?;
                let part = MultipartPart::bytes(bytes)
                    .file_name(image_ref.path.clone())
                    .mime_str(image_ref.mime_type.as_deref().unwrap_or("image/png"))?;
                form = form.part("image[]", part);
            }
            self.http
                .post(format!("{}/v1/images/edits", self.config.api_base))
                .bearer_auth(&self.config.api_key)
                .multipart(form)
                .send()
                .context("studio image edit request failed")?
        };

        let body = response_json_or_error("studio", response)?;
        let image_b64 = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_object)
            .and_then(|row| row.get("b64_json"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("studio response missing image bytes"))?;
        let bytes = BASE64
            .decode(image_b64.as_bytes())
            .context("studio image base64 decode failed")?;
        Ok(Asset {
            bytes,
            mime_type: "image/png".to_string(),
        })
    }
}

impl GenerationProvider for StudioProvider {
    fn name(&self) -> &str {
        "studio"
    }

    fn generate(&self, instruction: &str, refs: &[ImageRef]) -> Result<Asset> {
        let max_transport_retries = 2u32;
        let mut attempt = 0u32;
        loop {
            match self.generate_once(instruction, refs) {
                Ok(asset) => return Ok(asset),
                Err(err) => {
                    if !is_retryable_transport_error(&err) || attempt >= max_transport_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    thread::sleep(Duration::from_secs_f64(2.0 * attempt as f64));
                }
            }
        }
    }
}

pub struct StudioCaptioner {
    config: StudioConfig,
    http: HttpClient,
}

impl StudioCaptioner {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            config,
            http: StudioConfig::http_client(),
        }
    }
}

impl CaptionProvider for StudioCaptioner {
    fn name(&self) -> &str {
        "studio"
    }

    fn caption(&self, asset: &Asset, context: &SessionContext) -> Result<String> {
        let mut starring = format!("starring {}", context.display_name());
        if let Some(handle) = context
            .handle
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            starring.push_str(&format!(" ({handle})"));
        }
        let instruction = format!(
            "Write one short, upbeat caption for this printable pet page, {starring}. \
             Refer to the pet as {} where a pronoun is needed. Reply with the caption only.",
            context.gender.pronoun()
        );
        let data_url = format!("data:{};base64,{}", asset.mime_type, BASE64.encode(&asset.bytes));
        let payload = json!({
            "model": self.config.text_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
            "max_tokens": 80,
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .context("studio caption request failed")?;
        let body = response_json_or_error("studio", response)?;
        extract_chat_text(&body).ok_or_else(|| anyhow::anyhow!("studio caption response was empty"))
    }
}

pub struct StudioOptimizer {
    config: StudioConfig,
    http: HttpClient,
}

impl StudioOptimizer {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            config,
            http: StudioConfig::http_client(),
        }
    }
}

impl PromptOptimizer for StudioOptimizer {
    fn name(&self) -> &str {
        "studio"
    }

    fn optimize(&self, raw_theme: &str) -> Result<String> {
        let payload = json!({
            "model": self.config.text_model,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Expand this pet illustration theme into one vivid sentence of scene \
                     detail. Keep the subject unchanged. Theme: {raw_theme}"
                ),
            }],
            "max_tokens": 120,
        });
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .context("studio optimize request failed")?;
        let body = response_json_or_error("studio", response)?;
        extract_chat_text(&body)
            .ok_or_else(|| anyhow::anyhow!("studio optimize response was empty"))
    }
}

fn extract_chat_text(body: &Map<String, Value>) -> Option<String> {
    body.get("choices")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Map<String, Value>> {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        bail!(
            "{label} request failed ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        );
    }
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => bail!("{label} returned non-object JSON: {other}"),
        Err(err) => bail!("{label} returned invalid JSON: {err}"),
    }
}

pub fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    let message = format!("{err:#}").to_ascii_lowercase();
    [
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "temporarily unavailable",
        "(429)",
        "(503)",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|pattern| message.contains(pattern))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use pawpress_contracts::context::Gender;

    use super::*;

    #[test]
    fn dryrun_generator_is_deterministic_per_instruction() {
        let provider = DryrunProvider;
        let first = provider.generate("a pirate pet", &[]).expect("generate");
        let second = provider.generate("a pirate pet", &[]).expect("generate");
        let other = provider.generate("a wizard pet", &[]).expect("generate");

        assert_eq!(first, second);
        assert_ne!(first.bytes, other.bytes);
        assert_eq!(first.mime_type, "image/png");
        assert_eq!(first.file_extension(), "png");
        // PNG signature.
        assert!(first.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn dryrun_caption_personalizes_with_name_and_handle() {
        let asset = DryrunProvider.generate("x", &[]).expect("generate");
        let context = SessionContext {
            pet_name: " Rex ".to_string(),
            handle: Some("@rexadventures".to_string()),
            gender: Gender::Boy,
            ..Default::default()
        };
        let caption = DryrunCaptioner.caption(&asset, &context).expect("caption");
        assert!(caption.contains("Rex"));
        assert!(caption.contains("@rexadventures"));
    }

    #[test]
    fn dryrun_optimizer_keeps_the_theme_text() {
        let optimized = DryrunOptimizer.optimize("the pet as a pirate").expect("optimize");
        assert!(optimized.starts_with("the pet as a pirate"));
        assert!(optimized.len() > "the pet as a pirate".len());
    }

    #[test]
    fn retryable_transport_errors_are_detected_by_pattern() {
        assert!(is_retryable_transport_error(&anyhow::anyhow!(
            "studio request failed (503): upstream unavailable"
        )));
        assert!(is_retryable_transport_error(&anyhow::anyhow!(
            "connection reset by peer"
        )));
        assert!(is_retryable_transport_error(&anyhow::anyhow!(
            "operation timed out"
        )));
        assert!(!is_retryable_transport_error(&anyhow::anyhow!(
            "studio request failed (400): bad prompt"
        )));
    }

    #[test]
    fn collaborator_set_for_provider_rejects_unknown_names() {
        assert!(CollaboratorSet::for_provider("dryrun").is_ok());
        let err = CollaboratorSet::for_provider("mystery").expect_err("unknown");
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn truncate_text_appends_ellipsis_only_when_needed() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghij", 4), "abcd…");
    }
}
