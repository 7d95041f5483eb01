//! Text analysis for full-text fields
//!
//! Analyzed fields go through:
//! SimpleTokenizer → LowerCaser → stopwords (language list + extras) → minimum length
//!
//! Exact-match keyword fields use a single lowercased token instead.

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    BoxTokenStream, Language as StemLanguage, LowerCaser, RawTokenizer, SimpleTokenizer,
    StopWordFilter, TextAnalyzer, Token, TokenFilter, TokenStream, Tokenizer,
};
use tantivy::Index;

/// Tokenizer name for case-insensitive keyword fields
pub const KEYWORD_TOKENIZER: &str = "keyword_lowercase";

/// Stopword list used by an analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Spanish,
    English,
    French,
    German,
    Italian,
    Portuguese,
    /// No stopword list, only extra stopwords apply
    Neutral,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::English => "en",
            Language::French => "fr",
            Language::German => "de",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Neutral => "xx",
        }
    }

    fn stopword_filter(&self) -> StopWordFilter {
        let language = match self {
            Language::Spanish => StemLanguage::Spanish,
            Language::English => StemLanguage::English,
            Language::French => StemLanguage::French,
            Language::German => StemLanguage::German,
            Language::Italian => StemLanguage::Italian,
            Language::Portuguese => StemLanguage::Portuguese,
            Language::Neutral => return StopWordFilter::remove(Vec::<String>::new()),
        };
        StopWordFilter::new(language).unwrap_or_else(|| {
            log::warn!("No stopword list for {:?}, indexing without one", self);
            StopWordFilter::remove(Vec::<String>::new())
        })
    }
}

/// Language policy of the full-text analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerConfig {
    pub language: Language,
    /// Tokens with fewer characters than this are dropped
    pub min_token_len: usize,
    pub extra_stopwords: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            language: Language::Spanish,
            min_token_len: 2,
            extra_stopwords: Vec::new(),
        }
    }
}

/// Full-text analyzer built from an [`AnalyzerConfig`]
#[derive(Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    inner: TextAnalyzer,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let extras: Vec<String> = config
            .extra_stopwords
            .iter()
            .map(|word| word.to_lowercase())
            .collect();

        let inner = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(config.language.stopword_filter())
            .filter(StopWordFilter::remove(extras))
            .filter(RemoveShortFilter::limit(config.min_token_len))
            .build();

        Self { config, inner }
    }

    /// Name the analyzer is registered under. Encodes the configuration so that
    /// indexes built with different analyzers have different schemas.
    pub fn tokenizer_name(&self) -> String {
        format!(
            "celene_{}_{}",
            self.config.language.code(),
            self.config.min_token_len
        )
    }

    /// Register this analyzer and the keyword normalizer with an index
    pub fn register(&self, index: &Index) {
        index
            .tokenizers()
            .register(&self.tokenizer_name(), self.inner.clone());
        index
            .tokenizers()
            .register(KEYWORD_TOKENIZER, keyword_analyzer());
    }

    /// Lazily tokenize `text`
    pub fn analyze<'t>(&self, text: &'t str) -> TokenSequence<'t> {
        TokenSequence {
            analyzer: self.inner.clone(),
            text,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn keyword_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build()
}

/// Normalize a keyword value the way the keyword tokenizer indexes it
pub fn normalize_keyword(value: &str) -> String {
    value.to_lowercase()
}

/// Token sequence over a piece of text. Every call to [`TokenSequence::iter`]
/// starts again from the first token.
pub struct TokenSequence<'t> {
    analyzer: TextAnalyzer,
    text: &'t str,
}

impl<'t> TokenSequence<'t> {
    pub fn iter(&mut self) -> Tokens<'_> {
        Tokens {
            stream: self.analyzer.token_stream(self.text),
        }
    }

    pub fn to_vec(&mut self) -> Vec<String> {
        self.iter().collect()
    }
}

pub struct Tokens<'a> {
    stream: BoxTokenStream<'a>,
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.stream.advance() {
            Some(self.stream.token().text.clone())
        } else {
            None
        }
    }
}

/// Drops tokens shorter than `min_len` characters
#[derive(Clone)]
pub struct RemoveShortFilter {
    min_len: usize,
}

impl RemoveShortFilter {
    pub fn limit(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl TokenFilter for RemoveShortFilter {
    type Tokenizer<T: Tokenizer> = RemoveShortFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        RemoveShortFilterWrapper {
            min_len: self.min_len,
            inner: tokenizer,
        }
    }
}

#[derive(Clone)]
pub struct RemoveShortFilterWrapper<T> {
    min_len: usize,
    inner: T,
}

impl<T: Tokenizer> Tokenizer for RemoveShortFilterWrapper<T> {
    type TokenStream<'a> = RemoveShortTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        RemoveShortTokenStream {
            min_len: self.min_len,
            tail: self.inner.token_stream(text),
        }
    }
}

pub struct RemoveShortTokenStream<T> {
    min_len: usize,
    tail: T,
}

impl<T: TokenStream> TokenStream for RemoveShortTokenStream<T> {
    fn advance(&mut self) -> bool {
        while self.tail.advance() {
            if self.tail.token().text.chars().count() >= self.min_len {
                return true;
            }
        }
        false
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}
