use std::ops::Range;

use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::StageError;
use crate::transform::Transform;

static XML_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<\?xml[^>]*\?>").expect("xml declaration regex"));
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static METADATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata\s*>").expect("metadata regex"));
static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").expect("whitespace regex"));
static RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace regex"));
static OPEN_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z][\w:.-]*)([^>]*)>").expect("open tag regex"));
static PRESERVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"xml:space\s*=\s*["']preserve["']"#).expect("xml:space regex")
});

/// Elements whose character data is rendered or parsed as written.
const SIGNIFICANT_WHITESPACE: [&str; 3] = ["text", "style", "script"];

/// How far into a payload to look for the root element.
const SNIFF_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SvgPlugin {
    RemoveXmlDeclaration,
    RemoveComments,
    RemoveMetadata,
    CollapseWhitespace,
}

impl SvgPlugin {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "removeXmlDeclaration" => Some(Self::RemoveXmlDeclaration),
            "removeComments" => Some(Self::RemoveComments),
            "removeMetadata" => Some(Self::RemoveMetadata),
            "collapseWhitespace" => Some(Self::CollapseWhitespace),
            _ => None,
        }
    }

    fn apply(self, text: &str) -> String {
        match self {
            Self::RemoveXmlDeclaration => XML_DECLARATION.replace(text, "").into_owned(),
            Self::RemoveComments => COMMENT.replace_all(text, "").into_owned(),
            Self::RemoveMetadata => METADATA.replace_all(text, "").into_owned(),
            Self::CollapseWhitespace => collapse_whitespace(text),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SvgOptions {
    pub plugins: Vec<String>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            plugins: vec![
                "removeXmlDeclaration".to_string(),
                "removeComments".to_string(),
                "removeMetadata".to_string(),
                "collapseWhitespace".to_string(),
            ],
        }
    }
}

/// Text-level SVG minifier driven by an ordered plugin list.
pub struct SvgTransform {
    plugins: Vec<SvgPlugin>,
}

impl SvgTransform {
    pub fn new(options: &SvgOptions) -> Result<Self> {
        let mut plugins = Vec::with_capacity(options.plugins.len());
        for name in &options.plugins {
            match SvgPlugin::parse(name.trim()) {
                Some(plugin) => plugins.push(plugin),
                None => bail!("unknown svg plugin: {name}"),
            }
        }
        Ok(Self { plugins })
    }
}

impl Transform for SvgTransform {
    fn name(&self) -> &str {
        "svg"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        if !looks_like_svg(input) {
            return Ok(input.to_vec());
        }
        let text = std::str::from_utf8(input)
            .map_err(|e| StageError::Malformed(format!("svg is not utf-8: {e}")))?;

        let mut current = text.to_string();
        for plugin in &self.plugins {
            current = plugin.apply(&current);
        }
        Ok(current.into_bytes())
    }
}

/// Collapse insignificant whitespace, leaving text content and
/// `xml:space="preserve"` subtrees byte-for-byte intact.
fn collapse_whitespace(text: &str) -> String {
    let protected = protected_ranges(text);
    // the whitespace starts one byte after the matched '>'
    let tight = BETWEEN_TAGS.replace_all(text, |caps: &Captures| {
        replace_outside(caps, &protected, 1, "><")
    });
    let protected = protected_ranges(&tight);
    RUNS.replace_all(&tight, |caps: &Captures| {
        replace_outside(caps, &protected, 0, " ")
    })
    .trim()
    .to_string()
}

fn replace_outside(
    caps: &Captures,
    protected: &[Range<usize>],
    offset: usize,
    with: &str,
) -> String {
    match caps.get(0) {
        Some(m) if protected.iter().any(|r| r.contains(&(m.start() + offset))) => {
            m.as_str().to_string()
        }
        Some(_) => with.to_string(),
        None => String::new(),
    }
}

/// Byte ranges of subtrees whose whitespace must survive.
fn protected_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut cursor = 0;
    for caps in OPEN_TAG.captures_iter(text) {
        let (Some(tag), Some(name), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if tag.start() < cursor || attrs.as_str().ends_with('/') {
            continue;
        }
        let name = name.as_str();
        let significant = SIGNIFICANT_WHITESPACE.iter().any(|n| *n == name);
        if significant || PRESERVE.is_match(attrs.as_str()) {
            let end = subtree_end(text, name, tag.end());
            ranges.push(tag.start()..end);
            cursor = end;
        }
    }
    ranges
}

/// Offset just past the close tag matching an element opened before `from`.
fn subtree_end(text: &str, name: &str, from: usize) -> usize {
    let open = format!("<{name}");
    let close = format!("</{name}");
    let mut depth = 1usize;
    let mut pos = from;
    while depth > 0 {
        let Some(close_at) = find_tag(text, &close, pos) else {
            return text.len();
        };
        match find_tag(text, &open, pos) {
            Some(open_at) if open_at < close_at => {
                let tag_end = tag_end(text, open_at);
                if !text[open_at..tag_end].ends_with("/>") {
                    depth += 1;
                }
                pos = tag_end;
            }
            _ => {
                depth -= 1;
                pos = tag_end(text, close_at);
            }
        }
    }
    pos
}

fn tag_end(text: &str, at: usize) -> usize {
    text[at..].find('>').map_or(text.len(), |i| at + i + 1)
}

/// Next `prefix` at or after `from` that is a whole tag name.
fn find_tag(text: &str, prefix: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(i) = text[pos..].find(prefix) {
        let at = pos + i;
        match text[at + prefix.len()..].chars().next() {
            None | Some('>' | '/') => return Some(at),
            Some(c) if c.is_whitespace() => return Some(at),
            _ => pos = at + prefix.len(),
        }
    }
    None
}

fn looks_like_svg(input: &[u8]) -> bool {
    let head = &input[..input.len().min(SNIFF_LEN)];
    let head = String::from_utf8_lossy(head);
    head.trim_start_matches('\u{feff}').trim_start().starts_with('<') && head.contains("<svg")
}
