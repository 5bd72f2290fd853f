use std::path::{Component, Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Chat/runtime config manifest. Lists the tokenizer files the model
/// needs; everything else in the document is irrelevant to downloading.
#[derive(Debug, Clone, Deserialize)]
pub struct MlcChatConfig {
    pub tokenizer_files: Vec<String>,
}

impl MlcChatConfig {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(bytes).context("parse mlc-chat-config.json")?;
        for name in &config.tokenizer_files {
            ensure_store_relative(name)?;
        }
        Ok(config)
    }
}

/// Array-cache manifest naming the weight-shard records. Record order is
/// the progress order, so it is kept exactly as the document lists it.
#[derive(Debug, Clone, Deserialize)]
pub struct NdarrayCache {
    pub records: Vec<NdarrayCacheRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdarrayCacheRecord {
    pub data_path: String,
}

impl NdarrayCache {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let cache: Self = serde_json::from_slice(bytes).context("parse ndarray-cache.json")?;
        for record in &cache.records {
            ensure_store_relative(&record.data_path)?;
        }
        Ok(cache)
    }
}

/// Manifest entries become store paths verbatim, so anything that could
/// escape the model directory is rejected at decode time.
fn ensure_store_relative(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("empty file name in manifest"));
    }
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(anyhow!("unsafe file name in manifest: {name}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_config_decodes_tokenizer_files_in_order() {
        let json = br#"{
            "model_type": "llama",
            "tokenizer_files": ["tokenizer.json", "vocab.json", "merges.txt"],
            "context_window_size": 4096
        }"#;
        let config = MlcChatConfig::decode(json).unwrap();
        assert_eq!(
            config.tokenizer_files,
            vec!["tokenizer.json", "vocab.json", "merges.txt"]
        );
    }

    #[test]
    fn ndarray_cache_decodes_record_data_paths_in_order() {
        let json = br#"{
            "metadata": {"ParamSize": 2},
            "records": [
                {"dataPath": "params_shard_0.bin", "format": "raw-shard", "nbytes": 131072},
                {"dataPath": "params_shard_1.bin", "format": "raw-shard", "nbytes": 65536}
            ]
        }"#;
        let cache = NdarrayCache::decode(json).unwrap();
        let paths: Vec<_> = cache.records.iter().map(|r| r.data_path.as_str()).collect();
        assert_eq!(paths, vec!["params_shard_0.bin", "params_shard_1.bin"]);
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        assert!(MlcChatConfig::decode(b"not json").is_err());
        assert!(NdarrayCache::decode(br#"{"records": [{"nbytes": 3}]}"#).is_err());
    }

    #[test]
    fn traversal_file_names_are_rejected() {
        let escape = br#"{"tokenizer_files": ["../../etc/passwd"]}"#;
        assert!(MlcChatConfig::decode(escape).is_err());

        let absolute = br#"{"records": [{"dataPath": "/etc/passwd"}]}"#;
        assert!(NdarrayCache::decode(absolute).is_err());

        let empty = br#"{"tokenizer_files": [""]}"#;
        assert!(MlcChatConfig::decode(empty).is_err());
    }

    #[test]
    fn nested_relative_names_are_allowed() {
        let json = br#"{"tokenizer_files": ["tokenizer/model.json"]}"#;
        let config = MlcChatConfig::decode(json).unwrap();
        assert_eq!(config.tokenizer_files, vec!["tokenizer/model.json"]);
    }
}
