//! Static analysis for markup languages
//!
//! Nothing is executed. The source is scanned for its title, headings,
//! paragraphs and styling, and summarized as a simulated rendering.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::types::{ExecutionOutcome, OutcomePhase};

/// First line of every rendering
pub const RENDERING_HEADER: &str = "Simulated rendering";

const NONE: &str = "(none)";

static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("title pattern is valid")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("heading pattern is valid")
});
static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("paragraph pattern is valid")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<style\b|\bstyle\s*=").expect("style pattern is valid"));

/// Structure extracted from a markup document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupSummary {
    pub title: Option<String>,

    /// Heading level and text, in document order
    pub headings: Vec<(u8, String)>,

    pub paragraphs: Vec<String>,

    /// Whether a `<style>` block or `style=` attribute is present
    pub styled: bool,
}

impl MarkupSummary {
    /// Scan a document
    ///
    /// Unclosed or malformed elements are skipped rather than reported.
    pub fn analyze(source: &str) -> Self {
        let title = TITLE
            .captures(source)
            .map(|caps| text_content(&caps[1]))
            .filter(|title| !title.is_empty());

        let headings = HEADING
            .captures_iter(source)
            .filter_map(|caps| {
                let level = caps[1].parse::<u8>().ok()?;
                let text = text_content(&caps[2]);
                (!text.is_empty()).then_some((level, text))
            })
            .collect();

        let paragraphs = PARAGRAPH
            .captures_iter(source)
            .map(|caps| text_content(&caps[1]))
            .filter(|text| !text.is_empty())
            .collect();

        Self {
            title,
            headings,
            paragraphs,
            styled: STYLE.is_match(source),
        }
    }

    /// Human-readable summary, one element per line
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RENDERING_HEADER}");
        let _ = writeln!(out, "Title: {}", self.title.as_deref().unwrap_or(NONE));

        if self.headings.is_empty() {
            let _ = writeln!(out, "Headings: {NONE}");
        }
        for (level, text) in &self.headings {
            let _ = writeln!(out, "H{level}: {text}");
        }

        if self.paragraphs.is_empty() {
            let _ = writeln!(out, "Paragraphs: {NONE}");
        }
        for text in &self.paragraphs {
            let _ = writeln!(out, "Paragraph: {text}");
        }

        let styling = if self.styled {
            "CSS styles detected"
        } else {
            "no styles detected"
        };
        let _ = write!(out, "Styling: {styling}");
        out
    }
}

/// Render a markup document without spawning anything
#[instrument(skip(source), fields(len = source.len()))]
pub fn render(source: &str) -> ExecutionOutcome {
    let summary = MarkupSummary::analyze(source);
    debug!(
        title = summary.title.is_some(),
        headings = summary.headings.len(),
        paragraphs = summary.paragraphs.len(),
        styled = summary.styled,
        "analyzed markup"
    );

    ExecutionOutcome {
        stdout: summary.to_text(),
        exit_code: Some(0),
        ..ExecutionOutcome::new(OutcomePhase::Rendered)
    }
}

/// Strip tags, decode common entities and collapse whitespace
fn text_content(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
