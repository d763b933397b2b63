//! Persisted user settings: API credential, chat model, embedder.

use std::fmt;

use tracing::warn;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

/// Chat models that may be selected.
pub const ALLOWED_MODELS: [&str; 2] = ["gemini-1.5-flash", "gemini-2.0-flash"];
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";
pub const EMBEDDER_ENV_VAR: &str = "PDFCHAT_EMBEDDER";

const API_KEY: &str = "api_key";
const MODEL_NAME: &str = "model_name";
const EMBEDDER: &str = "embedder";

/// Which embedder produces passage vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EmbedderKind {
    /// Remote embeddings from the Gemini API
    #[default]
    Gemini,
    /// ColBERT running locally, mean-pooled
    Local,
}

impl EmbedderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub model_name: String,
    pub embedder: EmbedderKind,
}

/// A partial change to [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub embedder: Option<EmbedderKind>,
}

/// Reject chat models outside [`ALLOWED_MODELS`].
pub fn validate_model(name: &str) -> Result<()> {
    if ALLOWED_MODELS.contains(&name) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "model '{name}' is not allowed; choose one of: {}",
            ALLOWED_MODELS.join(", ")
        )))
    }
}

impl Settings {
    /// Read settings at startup.
    ///
    /// A missing stored key falls back to `GEMINI_API_KEY`. A stored model
    /// outside the allow-list falls back to the default. `PDFCHAT_EMBEDDER`
    /// overrides the stored embedder.
    pub fn load(db: &ConfigDb) -> Result<Self> {
        let api_key = db
            .get_setting(API_KEY)?
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
            .unwrap_or_default();

        let mut model_name = db.get_setting_or(MODEL_NAME, DEFAULT_MODEL)?;
        if validate_model(&model_name).is_err() {
            warn!(model = %model_name, "stored model is not allowed, using {DEFAULT_MODEL}");
            model_name = DEFAULT_MODEL.to_string();
        }

        let embedder = std::env::var(EMBEDDER_ENV_VAR)
            .ok()
            .and_then(|v| EmbedderKind::parse(&v))
            .or(db.get_setting(EMBEDDER)?.and_then(|v| EmbedderKind::parse(&v)))
            .unwrap_or_default();

        Ok(Self {
            api_key,
            model_name,
            embedder,
        })
    }

    /// Validate and persist a change. Nothing is written if validation fails.
    pub fn update(&mut self, db: &ConfigDb, update: SettingsUpdate) -> Result<()> {
        if let Some(model) = &update.model_name {
            validate_model(model)?;
        }

        if let Some(key) = update.api_key {
            db.set_setting(API_KEY, &key)?;
            self.api_key = key;
        }
        if let Some(model) = update.model_name {
            db.set_setting(MODEL_NAME, &model)?;
            self.model_name = model;
        }
        if let Some(embedder) = update.embedder {
            db.set_setting(EMBEDDER, embedder.as_str())?;
            self.embedder = embedder;
        }
        Ok(())
    }

    /// Forget every stored setting and reload, so the environment and the
    /// defaults apply again.
    pub fn reset(db: &ConfigDb) -> Result<Self> {
        for key in [API_KEY, MODEL_NAME, EMBEDDER] {
            db.remove_setting(key)?;
        }
        Self::load(db)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// The API key with all but its last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }
        let visible = chars.len().min(4);
        let tail: String = chars[chars.len() - visible..].iter().collect();
        format!("{}{tail}", "*".repeat(chars.len() - visible))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.masked_api_key())
            .field("model_name", &self.model_name)
            .field("embedder", &self.embedder)
            .finish()
    }
}
