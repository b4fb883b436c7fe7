use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "automation_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Post,
    Reply,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Post => "post",
            ActionKind::Reply => "reply",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one automated action: (tenant, location, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub tenant_id: String,
    pub location_id: String,
    pub kind: ActionKind,
}

impl ActionKey {
    pub fn new(tenant_id: impl Into<String>, location_id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            location_id: location_id.into(),
            kind,
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant_id, self.location_id, self.kind)
    }
}
