//! Scoped-tag text extraction over a flat HTML token stream.
//!
//! The document is fed through the HTML5 tokenizer alone, without a tree
//! builder: the sink sees open tags, close tags and text in document order.
//! A region opens on a `tag` whose `attr_key` attribute equals `attr_value`;
//! inside it, every nested tag with the same name deepens the region whether
//! or not it carries the attribute, so inner text is kept and the region ends
//! at its own closing tag.
//!
//! Script and style bodies are raw text to the tokenizer, so markup inside
//! them never opens or closes a region, and their text is not article text.

use std::cell::RefCell;

use feedwatch_core::ExtractRule;
use html5ever::{LocalName, TokenizerResult};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};

/// Concatenated text of every region in `document` matched by `rule`.
///
/// Malformed markup never fails: the tokenizer recovers from parse errors the
/// way a browser does (a stray `<` is text, an unclosed tag at the end of input
/// is dropped). A region still open at the end of the document is dropped.
pub fn extract_text(document: &[u8], rule: &ExtractRule) -> String {
    let input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(&String::from_utf8_lossy(document)));

    let tokenizer = Tokenizer::new(RegionSink::new(rule), TokenizerOpts::default());
    while !matches!(tokenizer.feed(&input), TokenizerResult::Done) {}
    tokenizer.end();

    tokenizer.sink.state.take().article
}

/// Elements whose content the tokenizer must read as raw text.
///
/// Without a tree builder nothing else switches the tokenizer state, so the
/// sink requests it on the start tag.
fn raw_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

#[derive(Default)]
struct ScanState {
    depth: usize,
    /// Open script-like element whose text is skipped.
    skipping: Option<LocalName>,
    block: String,
    article: String,
}

struct RegionSink<'r> {
    rule: &'r ExtractRule,
    state: RefCell<ScanState>,
}

impl<'r> RegionSink<'r> {
    fn new(rule: &'r ExtractRule) -> Self {
        Self { rule, state: RefCell::new(ScanState::default()) }
    }

    fn is_rule_tag(&self, name: &LocalName) -> bool {
        str::eq_ignore_ascii_case(name, &self.rule.tag)
    }

    /// Whether `tag` carries `rule.attr_key` with exactly `rule.attr_value`.
    fn opens_region(&self, tag: &Tag) -> bool {
        tag.attrs.iter().any(|attr| {
            str::eq_ignore_ascii_case(&attr.name.local, &self.rule.attr_key) && *attr.value == *self.rule.attr_value
        })
    }

    fn start_tag(&self, state: &mut ScanState, tag: &Tag) -> TokenSinkResult<()> {
        if !tag.self_closing && self.is_rule_tag(&tag.name) && (state.depth > 0 || self.opens_region(tag)) {
            state.depth += 1;
        }

        match raw_kind(&tag.name) {
            Some(kind) => {
                if !matches!(kind, RawKind::Rcdata) {
                    state.skipping = Some(tag.name.clone());
                }
                TokenSinkResult::RawData(kind)
            }
            None => TokenSinkResult::Continue,
        }
    }

    fn end_tag(&self, state: &mut ScanState, tag: &Tag) {
        if state.skipping.as_ref() == Some(&tag.name) {
            state.skipping = None;
        }

        if state.depth >= 1 && self.is_rule_tag(&tag.name) {
            state.depth -= 1;
            if state.depth == 0 {
                let block = std::mem::take(&mut state.block);
                state.article.push_str(&block);
            }
        }
    }
}

impl TokenSink for RegionSink<'_> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(&mut state, &tag),
                TagKind::EndTag => self.end_tag(&mut state, &tag),
            },
            Token::CharacterTokens(text) if state.depth > 0 && state.skipping.is_none() => {
                state.block.push_str(&text);
            }
            Token::ParseError(e) => tracing::trace!("html parse error: {e}"),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}
