use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Sampling parameters forwarded to the model server. A chat may carry its
/// own override; otherwise the global settings apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub num_predict: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            seed: None,
            num_predict: None,
        }
    }
}

/// Read-only settings snapshot consumed per send. The core never writes
/// settings; ownership stays with the host application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Stream tokens into the UI as they arrive, or wait for the full
    /// response.
    pub show_live_response: bool,
    /// Context window size requested from the server.
    pub context_length: u32,
    pub system_prompt: String,
    pub params: GenerationParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_live_response: true,
            context_length: 4096,
            system_prompt: String::new(),
            params: GenerationParams::default(),
        }
    }
}

/// Source of the settings snapshot used for a send.
pub trait SettingsProvider: Send + Sync + 'static {
    fn snapshot(&self) -> Settings;
}

/// Settings held in memory, updatable by the host between sends.
#[derive(Default)]
pub struct StaticSettings {
    inner: RwLock<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(settings),
        })
    }

    pub fn update(&self, settings: Settings) {
        *self.inner.write() = settings;
    }
}

impl SettingsProvider for StaticSettings {
    fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let provider = StaticSettings::new(Settings::default());
        assert!(provider.snapshot().show_live_response);

        let mut changed = Settings::default();
        changed.show_live_response = false;
        changed.context_length = 8192;
        provider.update(changed);

        let snap = provider.snapshot();
        assert!(!snap.show_live_response);
        assert_eq!(snap.context_length, 8192);
    }
}
