//! Wiring: settings to backends to a ready `TurnEngine`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value as Json};
use tracing::info;

use stagehand_core::api::{
    load_document, ClassifyBackend, GenerateBackend, IdentityProfile, TurnEngine,
};
use stagehand_plugins::{
    FailoverClassifier, HttpClassifier, HttpGenerator, LexicalClassifier, LlmClassifier,
};

use crate::settings::{ClassifyMode, Settings};

pub fn build_engine(
    settings: &Settings,
    scenario_path: &Path,
    saved: Option<&Map<String, Json>>,
) -> Result<TurnEngine> {
    let json = std::fs::read_to_string(scenario_path)
        .with_context(|| format!("reading scenario from {}", scenario_path.display()))?;
    let document = load_document(&json)
        .with_context(|| format!("loading scenario from {}", scenario_path.display()))?;

    let generate: Arc<dyn GenerateBackend> =
        Arc::new(HttpGenerator::new(settings.backends.generate_url.clone()));
    let classify = build_classifier(settings, generate.clone());

    let identity = IdentityProfile {
        user: settings.identity.user.clone(),
        persona: settings.identity.persona.clone(),
        char_name: settings.identity.char_name.clone(),
        personality: settings.identity.personality.clone(),
        scenario: settings.identity.scenario.clone(),
    };

    Ok(TurnEngine::new(document, identity, saved, classify, generate))
}

fn build_classifier(
    settings: &Settings,
    generate: Arc<dyn GenerateBackend>,
) -> Arc<dyn ClassifyBackend> {
    let mode = match settings.backends.classify_mode {
        ClassifyMode::Auto if settings.backends.classify_url.is_empty() => ClassifyMode::Llm,
        ClassifyMode::Auto => ClassifyMode::Http,
        explicit => explicit,
    };

    match mode {
        ClassifyMode::Http | ClassifyMode::Auto => {
            info!(url = %settings.backends.classify_url, "classification via HTTP with lexical fallback");
            Arc::new(FailoverClassifier::new(
                Arc::new(HttpClassifier::new(settings.backends.classify_url.clone())),
                Arc::new(LexicalClassifier::new()),
            ))
        }
        ClassifyMode::Llm => {
            info!("classification via the text generation backend");
            Arc::new(LlmClassifier::new(generate))
        }
        ClassifyMode::Lexical => {
            info!("classification via the local lexical matcher");
            Arc::new(LexicalClassifier::new())
        }
    }
}

/// Read persisted variable state, tolerating a missing file.
pub fn read_state(path: &Path) -> Result<Option<Map<String, Json>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading state from {}", path.display()))?;
    let json: Json = serde_json::from_str(&text)
        .with_context(|| format!("parsing state in {}", path.display()))?;
    match json {
        Json::Object(map) => Ok(Some(map)),
        _ => anyhow::bail!("state file {} is not a JSON object", path.display()),
    }
}

pub fn write_state(path: &Path, state: &Map<String, Json>) -> Result<()> {
    let text = serde_json::to_string_pretty(&Json::Object(state.clone()))?;
    std::fs::write(path, text)
        .with_context(|| format!("writing state to {}", path.display()))
}
