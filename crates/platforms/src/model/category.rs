use serde::{Deserialize, Serialize};

/// Top-level category with its sub categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub children: Vec<SubCategory>,
}

/// A browsable sub category. `parent_id` is needed by some platforms to list rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
}

impl SubCategory {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: parent_id.into(),
            pic: None,
        }
    }

    pub fn with_pic(mut self, pic: impl Into<String>) -> Self {
        self.pic = Some(pic.into());
        self
    }
}
