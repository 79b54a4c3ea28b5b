use std::collections::HashSet;

/// Normalized apply URLs already known to the store or accepted earlier in this run.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    urls: HashSet<String>,
}

impl DedupIndex {
    pub fn new(urls: HashSet<String>) -> Self {
        Self { urls }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn contains(&self, normalized_url: &str) -> bool {
        self.urls.contains(normalized_url)
    }

    pub fn add(&mut self, normalized_url: &str) {
        self.urls.insert(normalized_url.to_string());
    }

    /// Accepts the URL when unseen and records it in the same step.
    pub fn try_accept(&mut self, normalized_url: &str) -> bool {
        if self.contains(normalized_url) {
            return false;
        }
        self.add(normalized_url);
        true
    }
}
