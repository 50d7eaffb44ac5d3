use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A selectable stream quality.
///
/// `data` is an opaque token understood only by the adapter that produced it,
/// `sort` ranks qualities of the same platform (higher is better).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayQuality {
    pub label: String,
    pub data: String,
    pub sort: i64,
}

impl PlayQuality {
    pub fn new(label: impl Into<String>, data: impl Into<String>, sort: i64) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
            sort,
        }
    }
}

/// Candidate stream URLs in preference order, plus the headers needed to fetch them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayUrl {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl PlayUrl {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The adapter's best recommendation, if any.
    pub fn best(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}
