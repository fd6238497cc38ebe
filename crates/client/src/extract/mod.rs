//! Article text extraction.
//!
//! Site-specific: an article is located by two scoped-tag rules, one for the
//! title and one for the body. No readability heuristics and no script
//! execution; pages that render their text client-side extract as empty.

pub mod scoped;

pub use scoped::extract_text;

use feedwatch_core::{AppConfig, ExtractRule};

/// Stable extractor trait for article text.
///
/// The text returned is what gets fingerprinted, so an implementation must be
/// deterministic for identical input.
pub trait Extractor: Send + Sync {
    /// Extract the article text from an HTML document.
    fn extract(&self, html: &[u8]) -> String;
}

/// Title + body extractor driven by two [`ExtractRule`]s.
///
/// The output is the title text, a newline, then the body text.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    title_rule: ExtractRule,
    body_rule: ExtractRule,
}

impl ArticleExtractor {
    pub fn new(title_rule: ExtractRule, body_rule: ExtractRule) -> Self {
        Self { title_rule, body_rule }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.title_rule.clone(), config.body_rule.clone())
    }
}

impl Default for ArticleExtractor {
    fn default() -> Self {
        Self::new(ExtractRule::default_title(), ExtractRule::default_body())
    }
}

impl Extractor for ArticleExtractor {
    fn extract(&self, html: &[u8]) -> String {
        let mut article = extract_text(html, &self.title_rule);
        article.push('\n');
        article.push_str(&extract_text(html, &self.body_rule));
        article
    }
}
