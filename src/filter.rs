use std::collections::HashSet;

use tracing::info;

use crate::item::Item;

pub const DEFAULT_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "svg"];

/// Allow-list of file extensions eligible for transformation.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    allowed: HashSet<String>,
    verbose: bool,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I, verbose: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed, verbose }
    }

    /// True when the item's lowercase extension is on the allow-list.
    pub fn accepts(&self, item: &Item) -> bool {
        let accepted = item
            .extension()
            .map(|ext| self.allowed.contains(&ext))
            .unwrap_or(false);
        if !accepted && self.verbose {
            info!("Skipping unsupported image {}", item.relative().display());
        }
        accepted
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS, false)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
