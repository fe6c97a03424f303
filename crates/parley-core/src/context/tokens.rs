//! Token counting for context budgeting.
//!
//! Tokenizer selection never fails. The order is: the tokenizer crate's own
//! model table, then the configured family prefixes, then the Claude prefix,
//! then the default encoding. If a BPE cannot be loaded at all the counter
//! degrades to a `bytes / 4` estimate.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};

use parley_types::config::{Encoding, TokenizerConfig};
use parley_types::llm::Message;

/// Fixed per-message cost modelling role and formatting tokens.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Loaded BPEs are expensive to build, so each encoding is loaded once per process.
static BPE_CACHE: LazyLock<DashMap<Encoding, Arc<CoreBPE>>> = LazyLock::new(DashMap::new);

/// Pick the encoding used to count tokens for `model`.
pub fn select_encoding(model: &str, config: &TokenizerConfig) -> Encoding {
    if let Some(encoding) = get_tokenizer(model).and_then(from_tokenizer) {
        return encoding;
    }
    if let Some(family) = config
        .family_prefixes
        .iter()
        .find(|f| model.starts_with(f.prefix.as_str()))
    {
        return family.encoding;
    }
    if !config.claude_prefix.is_empty() && model.starts_with(config.claude_prefix.as_str()) {
        return config.claude_encoding;
    }
    config.default_encoding
}

#[allow(unreachable_patterns)]
fn from_tokenizer(tokenizer: Tokenizer) -> Option<Encoding> {
    match tokenizer {
        Tokenizer::O200kBase => Some(Encoding::O200kBase),
        Tokenizer::Cl100kBase => Some(Encoding::Cl100kBase),
        Tokenizer::P50kBase | Tokenizer::P50kEdit => Some(Encoding::P50kBase),
        Tokenizer::R50kBase | Tokenizer::Gpt2 => Some(Encoding::R50kBase),
        _ => None,
    }
}

fn load_bpe(encoding: Encoding) -> Option<Arc<CoreBPE>> {
    if let Some(bpe) = BPE_CACHE.get(&encoding) {
        return Some(Arc::clone(bpe.value()));
    }
    let loaded = match encoding {
        Encoding::O200kBase => tiktoken_rs::o200k_base(),
        Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
        Encoding::P50kBase => tiktoken_rs::p50k_base(),
        Encoding::R50kBase => tiktoken_rs::r50k_base(),
    };
    match loaded {
        Ok(bpe) => {
            let bpe = Arc::new(bpe);
            BPE_CACHE.insert(encoding, Arc::clone(&bpe));
            Some(bpe)
        }
        Err(e) => {
            tracing::warn!(%encoding, error = %e, "failed to load tokenizer, using byte estimate");
            None
        }
    }
}

/// Counts tokens for one model's messages.
#[derive(Clone)]
pub struct TokenCounter {
    encoding: Encoding,
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    pub fn for_model(model: &str, config: &TokenizerConfig) -> Self {
        let encoding = select_encoding(model, config);
        tracing::debug!(model, %encoding, "selected tokenizer");
        Self::with_encoding(encoding)
    }

    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            encoding,
            bpe: load_bpe(encoding),
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Raw token count of `text`, without message overhead.
    pub fn count_text(&self, text: &str) -> u32 {
        let n = match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len() / 4,
        };
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Tokens for one message: content plus [`MESSAGE_OVERHEAD_TOKENS`].
    ///
    /// `None` is the only input that counts as zero.
    pub fn count(&self, message: Option<&Message>) -> u32 {
        match message {
            None => 0,
            Some(m) => self
                .count_text(&m.content)
                .saturating_add(MESSAGE_OVERHEAD_TOKENS),
        }
    }

    /// Sum of [`count`](Self::count) over `messages`.
    pub fn count_all(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.count(Some(m))))
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding)
            .field("loaded", &self.bpe.is_some())
            .finish()
    }
}
