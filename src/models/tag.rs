use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub remote_id: i64,
    pub label: String,
}

/// A tag that has not been written to the mirror yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub remote_id: i64,
    pub label: String,
}
