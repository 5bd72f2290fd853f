use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::Model;

/// Static app configuration: the list of models available for download.
/// Shipped as a JSON document (`mlc-app-config.json`) and read once at
/// startup; the downloader never mutates it.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model_list: Vec<Model>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read app config {}", path.display()))?;
        let config: Self = serde_json::from_slice(&bytes).context("parse app config json")?;
        Ok(config)
    }

    #[must_use]
    pub fn model(&self, model_id: &str) -> Option<&Model> {
        self.model_list
            .iter()
            .find(|model| model.model_id == model_id)
    }
}
