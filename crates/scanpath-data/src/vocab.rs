//! WordPiece vocabulary used to decode generated explanations

use crate::error::DataError;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Contractions re-attached after joining tokens with spaces
const CLEANUP_RULES: [(&str, &str); 10] = [
    (" .", "."),
    (" ?", "?"),
    (" !", "!"),
    (" ,", ","),
    (" ' ", "'"),
    (" n't", "n't"),
    (" 'm", "'m"),
    (" 's", "'s"),
    (" 've", "'ve"),
    (" 're", "'re"),
];

/// Vocabulary mapping token IDs back to WordPiece tokens
///
/// Maintains bidirectional mappings plus the set of special tokens
/// (`[CLS]`, `[SEP]`, `[PAD]`, ...) that are dropped when decoding.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Mapping from token to ID
    token_to_id: HashMap<String, u32>,
    /// Mapping from ID to token
    id_to_token: HashMap<u32, String>,
    /// IDs skipped during decoding
    special_ids: HashSet<u32>,
}

impl Vocabulary {
    /// Create a new empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vocabulary where token `i` has ID `i`
    ///
    /// Bracketed tokens such as `[CLS]` are registered as special tokens.
    /// A repeated token keeps its first ID for lookups, but every position
    /// still decodes.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for (id, token) in (0u32..).zip(tokens) {
            let token = token.into();
            if token.len() > 2 && token.starts_with('[') && token.ends_with(']') {
                vocab.special_ids.insert(id);
            }
            vocab.token_to_id.entry(token.clone()).or_insert(id);
            vocab.id_to_token.insert(id, token);
        }
        vocab
    }

    /// Load a vocabulary file
    ///
    /// `.json` files hold a list of tokens; any other file is read as a
    /// `vocab.txt` with one token per line. Line/list position is the ID.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary file: {:?}", path))?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            let tokens: Vec<String> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse vocabulary file: {:?}", path))?;
            Ok(Self::from_tokens(tokens))
        } else {
            Ok(Self::from_tokens(content.lines()))
        }
    }

    /// Get the token for an ID
    pub fn id_to_token(&self, id: u32) -> Result<&str, DataError> {
        self.id_to_token
            .get(&id)
            .map(|s| s.as_str())
            .ok_or(DataError::IdNotFound(id))
    }

    /// Get the ID for a token, if present
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    /// Number of IDs, one per input position
    pub fn size(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// Decode token IDs into text, skipping special tokens
    ///
    /// `##` continuation pieces are glued to the previous token and spaces
    /// before punctuation and contractions are removed.
    pub fn decode(&self, ids: &[u32]) -> Result<String, DataError> {
        let mut text = String::new();
        for &id in ids {
            if self.is_special(id) {
                continue;
            }
            let token = self.id_to_token(id)?;
            match token.strip_prefix("##") {
                Some(piece) => text.push_str(piece),
                None => {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(token);
                }
            }
        }

        for (from, to) in CLEANUP_RULES {
            text = text.replace(from, to);
        }
        Ok(text)
    }
}
