use serde::{Deserialize, Serialize};

use crate::store::AttrRecord;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub assigned_only: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttrRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrResponse {
    pub id: i64,
    pub name: String,
}

impl From<AttrRecord> for AttrResponse {
    fn from(a: AttrRecord) -> Self {
        Self {
            id: a.id,
            name: a.name,
        }
    }
}
