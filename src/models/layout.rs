use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const FILE_NAME_MLC_CHAT_CONFIG: &str = "mlc-chat-config.json";
pub const FILE_NAME_NDARRAY_CACHE: &str = "ndarray-cache.json";
pub const FILE_NAME_FINISHED: &str = "finished.txt";

/// Static descriptor of one model, supplied by the app config. Never
/// mutated by the downloader; every local and remote path derives from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub model_id: String,
    pub model_lib: String,
    /// The repository URL, e.g. `https://huggingface.co/mlc-ai/...`.
    pub model_url: String,
    pub estimated_vram_bytes: u64,
    pub name: String,
    pub bytes: u64,
    pub group: String,
}

/// Root directories the store and scratch trees live under. Each model
/// gets its own subdirectory keyed by `model_id`, so concurrent instances
/// never touch each other's files.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub models_root: PathBuf,
    pub temp_root: PathBuf,
}

impl StoreLayout {
    #[must_use]
    pub fn new(models_root: PathBuf, temp_root: PathBuf) -> Self {
        Self {
            models_root,
            temp_root,
        }
    }

    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "MlcChat", "MlcChat")
            .context("missing project directories")?;
        Ok(Self {
            models_root: project_dirs.cache_dir().join("models"),
            temp_root: std::env::temp_dir().join("mlc-downloader"),
        })
    }
}

/// Resolved locations for one model: permanent store entries, the scratch
/// mirror for in-flight records, and remote repository URLs.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    local_dir: PathBuf,
    scratch_dir: PathBuf,
    repo_base: String,
}

impl ModelPaths {
    #[must_use]
    pub fn new(layout: &StoreLayout, model: &Model) -> Self {
        Self {
            local_dir: layout.models_root.join(&model.model_id),
            scratch_dir: layout.temp_root.join(&model.model_id),
            repo_base: format!("{}/resolve/main", model.model_url.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    #[must_use]
    pub fn chat_config(&self) -> PathBuf {
        self.local_dir.join(FILE_NAME_MLC_CHAT_CONFIG)
    }

    #[must_use]
    pub fn ndarray_cache(&self) -> PathBuf {
        self.local_dir.join(FILE_NAME_NDARRAY_CACHE)
    }

    #[must_use]
    pub fn tokenizer_file(&self, name: &str) -> PathBuf {
        self.local_dir.join(name)
    }

    #[must_use]
    pub fn record(&self, data_path: &str) -> PathBuf {
        self.local_dir.join(data_path)
    }

    #[must_use]
    pub fn finished_marker(&self) -> PathBuf {
        self.local_dir.join(FILE_NAME_FINISHED)
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Scratch mirrors the store's relative record paths, so placement is
    /// a plain rename.
    #[must_use]
    pub fn scratch_record(&self, data_path: &str) -> PathBuf {
        self.scratch_dir.join(data_path)
    }

    #[must_use]
    pub fn chat_config_url(&self) -> String {
        self.file_url(FILE_NAME_MLC_CHAT_CONFIG)
    }

    #[must_use]
    pub fn ndarray_cache_url(&self) -> String {
        self.file_url(FILE_NAME_NDARRAY_CACHE)
    }

    #[must_use]
    pub fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.repo_base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model {
            model_id: "Llama-3.2-1B-Instruct-q4f16_1-MLC".into(),
            model_lib: "llama_q4f16_1".into(),
            model_url: "https://huggingface.co/mlc-ai/Llama-3.2-1B-Instruct-q4f16_1-MLC/".into(),
            estimated_vram_bytes: 879_040_512,
            name: "Llama 3.2 1B".into(),
            bytes: 668_000_000,
            group: "Llama 3.2".into(),
        }
    }

    fn layout() -> StoreLayout {
        StoreLayout::new(PathBuf::from("/data/models"), PathBuf::from("/tmp/dl"))
    }

    #[test]
    fn store_paths_are_namespaced_by_model_id() {
        let paths = ModelPaths::new(&layout(), &model());
        assert_eq!(
            paths.local_dir(),
            Path::new("/data/models/Llama-3.2-1B-Instruct-q4f16_1-MLC")
        );
        assert_eq!(
            paths.chat_config(),
            Path::new("/data/models/Llama-3.2-1B-Instruct-q4f16_1-MLC/mlc-chat-config.json")
        );
        assert_eq!(
            paths.finished_marker(),
            Path::new("/data/models/Llama-3.2-1B-Instruct-q4f16_1-MLC/finished.txt")
        );
        assert_eq!(
            paths.scratch_record("params_shard_0.bin"),
            Path::new("/tmp/dl/Llama-3.2-1B-Instruct-q4f16_1-MLC/params_shard_0.bin")
        );
    }

    #[test]
    fn repository_urls_resolve_under_main() {
        let paths = ModelPaths::new(&layout(), &model());
        assert_eq!(
            paths.chat_config_url(),
            "https://huggingface.co/mlc-ai/Llama-3.2-1B-Instruct-q4f16_1-MLC/resolve/main/mlc-chat-config.json"
        );
        assert_eq!(
            paths.file_url("params_shard_3.bin"),
            "https://huggingface.co/mlc-ai/Llama-3.2-1B-Instruct-q4f16_1-MLC/resolve/main/params_shard_3.bin"
        );
    }

    #[test]
    fn model_descriptor_parses_from_snake_case_json() {
        let json = r#"{
            "model_id": "Qwen2.5-0.5B-Instruct-q4f16_1-MLC",
            "model_lib": "qwen2_q4f16_1",
            "model_url": "https://huggingface.co/mlc-ai/Qwen2.5-0.5B-Instruct-q4f16_1-MLC",
            "estimated_vram_bytes": 500000000,
            "name": "Qwen 2.5 0.5B",
            "bytes": 300000000,
            "group": "Qwen"
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        assert_eq!(model.model_id, "Qwen2.5-0.5B-Instruct-q4f16_1-MLC");
        assert_eq!(model.bytes, 300_000_000);
    }
}
