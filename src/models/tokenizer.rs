//! Prompt tokenization using HuggingFace tokenizers

use crate::{Error, Result};
use std::path::Path;
use tokenizers::Tokenizer;

/// Tokenizer loaded from a model directory's `tokenizer.json`
pub struct PromptTokenizer {
    tokenizer: Tokenizer,
}

impl PromptTokenizer {
    /// Load `tokenizer.json` from a model directory
    pub fn from_dir(model_dir: impl AsRef<Path>) -> Result<Self> {
        let tokenizer_path = model_dir.as_ref().join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(Error::Tokenizer(format!(
                "No tokenizer.json found in {:?}",
                model_dir.as_ref()
            )));
        }

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer.json: {}", e)))?;
        Ok(Self { tokenizer })
    }

    /// Encode a prompt, adding the model's special tokens (BOS, etc.)
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(format!("Encoding failed: {}", e)))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token IDs, skipping special tokens
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenizer(format!("Decoding failed: {}", e)))
    }

    /// End-of-sequence token ID, if the vocabulary has one
    pub fn eos_token_id(&self) -> Option<u32> {
        ["</s>", "<|end_of_text|>", "<|eot_id|>", "<|endoftext|>"]
            .iter()
            .find_map(|token| self.tokenizer.token_to_id(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PromptTokenizer::from_dir(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Tokenizer(_)));
    }

    #[test]
    fn test_malformed_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "not json").unwrap();
        assert!(matches!(
            PromptTokenizer::from_dir(dir.path()),
            Err(Error::Tokenizer(_))
        ));
    }
}
