//! Cleans generated HTML before it is published.
//!
//! Content is NFKC-normalized first, so compatibility forms such as
//! fullwidth angle brackets cannot turn into markup after cleaning. Then
//! `ammonia` reparses it as an HTML fragment, which closes dangling tags and
//! drops scripts, styles and document wrappers.

use ammonia::Builder;
use devlog_core::contract::Sanitizer;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

pub struct HtmlSanitizer {
    cleaner: Builder<'static>,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        let mut cleaner = Builder::default();
        // Keeps `language-*` hints on code blocks.
        cleaner.add_generic_attributes(["class"]);
        Self { cleaner }
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer for HtmlSanitizer {
    fn sanitize(&self, content: &str) -> String {
        let normalized: String = content.nfkc().collect();
        let cleaned = self.cleaner.clean(&normalized).to_string();
        if cleaned != content {
            info!(before = content.len(), after = cleaned.len(), "Sanitized generated content");
        } else {
            debug!("Generated content needed no cleaning");
        }
        cleaned
    }
}
