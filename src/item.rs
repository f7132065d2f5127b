//! # Items
//!
//! In-memory file items that flow through the pipeline.

use std::io::Read;
use std::path::{Path, PathBuf};

/// Payload carried by an [`Item`].
pub enum Contents {
    /// No payload; passed through untouched.
    Null,
    /// Fully materialized buffer.
    Buffer(Vec<u8>),
    /// Streamed payload. Never transformed by the engine.
    Stream(Box<dyn Read + Send>),
}

impl std::fmt::Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contents::Null => f.write_str("Null"),
            Contents::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            Contents::Stream(_) => f.write_str("Stream(<dyn Read>)"),
        }
    }
}

#[derive(Debug)]
pub struct Item {
    pub path: PathBuf,
    /// Base directory used to compute [`Item::relative`].
    pub base: Option<PathBuf>,
    pub contents: Contents,
}

impl Item {
    pub fn new(path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            base: None,
            contents: Contents::Buffer(contents),
        }
    }

    pub fn null(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base: None,
            contents: Contents::Null,
        }
    }

    pub fn stream(path: impl Into<PathBuf>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            path: path.into(),
            base: None,
            contents: Contents::Stream(reader),
        }
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self.contents, Contents::Null)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.contents, Contents::Stream(_))
    }

    pub fn buffer(&self) -> Option<&[u8]> {
        match &self.contents {
            Contents::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    /// Payload size in bytes; zero for null and streamed items.
    pub fn size(&self) -> u64 {
        self.buffer().map(|b| b.len() as u64).unwrap_or(0)
    }

    /// Path relative to the item's base, falling back to the full path.
    pub fn relative(&self) -> &Path {
        match &self.base {
            Some(base) => self.path.strip_prefix(base).unwrap_or(&self.path),
            None => &self.path,
        }
    }

    /// Lowercased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_strips_base() {
        let item = Item::new("/src/img/a.png", vec![1, 2, 3]).with_base("/src");
        assert_eq!(item.relative(), Path::new("img/a.png"));
        assert_eq!(item.size(), 3);
    }

    #[test]
    fn relative_falls_back_when_outside_base() {
        let item = Item::new("/other/a.png", Vec::new()).with_base("/src");
        assert_eq!(item.relative(), Path::new("/other/a.png"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(Item::null("A.JPG").extension().as_deref(), Some("jpg"));
        assert_eq!(Item::null("Makefile").extension(), None);
        assert_eq!(Item::null("trailing.").extension(), None);
    }

    #[test]
    fn stream_and_null_have_zero_size() {
        let stream = Item::stream("a.png", Box::new(std::io::empty()));
        assert!(stream.is_stream());
        assert_eq!(stream.size(), 0);
        assert!(Item::null("a.png").is_null());
    }
}
