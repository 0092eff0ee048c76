// src/model.rs
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::config::{ModelBackend, ModelConfig};
use crate::error::{AppError, Result};
use crate::frame::ImageFrame;
use crate::prompts::{LIVE_SYSTEM_PROMPT, UPLOAD_SYSTEM_PROMPT, UPLOAD_USER_PROMPT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// A single uploaded screenshot.
    Upload,
    /// A frame grabbed from the live screen capture.
    Live,
}

/// Multimodal model: image in, free-text signal description out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalModel: Send + Sync {
    async fn analyze(&self, frame: &ImageFrame, kind: AnalysisKind) -> Result<String>;
}

pub fn build_model(cfg: &ModelConfig) -> Result<Arc<dyn SignalModel>> {
    let model: Arc<dyn SignalModel> = match cfg.backend {
        ModelBackend::Gemini => Arc::new(GeminiClient::new(cfg)?),
        ModelBackend::Sim => {
            info!("Using simulated model replies");
            Arc::new(SimModel)
        }
    };
    Ok(model)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    upload_temperature: f32,
    live_temperature: f32,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&cfg.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "API key not set: configure model.api_key or {}",
                    cfg.api_key_env
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            upload_temperature: cfg.upload_temperature,
            live_temperature: cfg.live_temperature,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl SignalModel for GeminiClient {
    #[instrument(skip(self, frame), fields(model = %self.model, mime = frame.mime()))]
    async fn analyze(&self, frame: &ImageFrame, kind: AnalysisKind) -> Result<String> {
        let payload = frame.base64_payload();
        let image = Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: frame.mime(),
                data: &payload,
            }),
        };

        let (system, parts, temperature) = match kind {
            AnalysisKind::Upload => (
                UPLOAD_SYSTEM_PROMPT,
                vec![
                    Part {
                        text: Some(UPLOAD_USER_PROMPT),
                        inline_data: None,
                    },
                    image,
                ],
                self.upload_temperature,
            ),
            AnalysisKind::Live => (LIVE_SYSTEM_PROMPT, vec![image], self.live_temperature),
        };

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system),
                    inline_data: None,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            generation_config: GenerationConfig { temperature },
        };

        debug!("Sending {} bytes of image data", frame.bytes().len());
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Error calling Gemini API: {}", e);
                AppError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            error!("Gemini API returned {}: {}", status, body);
            return Err(AppError::Model(format!("status {}: {}", status, body)));
        }

        let reply: GenerateResponse = response.json().await?;
        let text = reply.text();
        if text.trim().is_empty() {
            return Err(AppError::Model("empty reply".into()));
        }

        debug!("Received {} chars from model", text.len());
        Ok(text)
    }
}

const SIM_ASSETS: &[&str] = &["EUR/USD", "GBP/JPY", "USD/JPY", "AUD/CAD", "BTC/USD"];
const SIM_REASONS: &[&str] = &["PAVIO", "FLUXO", "DESCANSO", "EXAUSTÃO"];

/// Offline stand-in that returns random, well-formed replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimModel;

#[async_trait]
impl SignalModel for SimModel {
    async fn analyze(&self, _frame: &ImageFrame, kind: AnalysisKind) -> Result<String> {
        let mut rng = rand::thread_rng();
        let signal = ["COMPRA", "VENDA", "AGUARDAR"]
            .choose(&mut rng)
            .copied()
            .unwrap_or("AGUARDAR");
        let asset = SIM_ASSETS.choose(&mut rng).copied().unwrap_or("EUR/USD");
        let reason = SIM_REASONS.choose(&mut rng).copied().unwrap_or("FLUXO");

        let reply = match kind {
            AnalysisKind::Upload => format!(
                "SINAL: {} | ATIVO: {} | ASSERTIVIDADE: {}% | MOTIVO: {} (simulado)",
                signal,
                asset,
                rng.gen_range(55..95),
                reason
            ),
            AnalysisKind::Live => {
                format!("Sinal de {} no {}. Motivo: {}.", signal, asset, reason)
            }
        };
        Ok(reply)
    }
}
