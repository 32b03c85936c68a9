//! Content rendering
//!
//! Turns stored block markup into the HTML a reader sees. Outgoing payloads
//! carry both forms; the rendered one is produced with autoembed off so
//! destinations receive bare URLs and re-embed them locally.

use std::sync::LazyLock;

use regex::Regex;

static BLOCK_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*/?wp:[^>]*?-->").expect("valid block delimiter regex"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

static STANDALONE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s<>]+$").expect("valid url regex"));

/// Options for one rendering pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Expand URLs standing alone on a line into embed markup
    pub autoembed: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { autoembed: true }
    }
}

impl RenderOptions {
    /// Options used for outgoing payloads
    pub fn for_distribution() -> Self {
        Self { autoembed: false }
    }
}

/// Renders stored post content
pub trait ContentRenderer: Send + Sync {
    fn render(&self, raw: &str, options: RenderOptions) -> String;
}

/// Renderer for block-editor markup
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockRenderer;

impl BlockRenderer {
    fn render_chunk(chunk: &str, options: RenderOptions) -> String {
        if STANDALONE_URL.is_match(chunk) {
            return if options.autoembed {
                format!(
                    "<figure class=\"wp-block-embed\"><div class=\"wp-block-embed__wrapper\">\
                     <a href=\"{chunk}\">{chunk}</a></div></figure>"
                )
            } else {
                chunk.to_string()
            };
        }

        // Already block-level markup
        if chunk.starts_with('<') {
            return chunk.to_string();
        }

        format!("<p>{}</p>", chunk.lines().map(str::trim).collect::<Vec<_>>().join("<br />\n"))
    }
}

impl ContentRenderer for BlockRenderer {
    fn render(&self, raw: &str, options: RenderOptions) -> String {
        let stripped = BLOCK_DELIMITER.replace_all(raw, "\n\n");
        let normalized = stripped.replace("\r\n", "\n");

        BLANK_LINES
            .split(&normalized)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| Self::render_chunk(chunk, options))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
