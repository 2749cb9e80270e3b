//! Action names and their broader action types

use serde::{Deserialize, Serialize};

/// Every action a module can execute on its attached stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionName {
    Fetch,
    Stream,
    Insert,
    Merge,
    Assign,
    Replace,
    DeleteProp,
    Delete,
}

impl ActionName {
    /// All actions, in the order store drivers implement them
    pub const ALL: [ActionName; 8] = [
        ActionName::Fetch,
        ActionName::Stream,
        ActionName::Insert,
        ActionName::Merge,
        ActionName::Assign,
        ActionName::Replace,
        ActionName::DeleteProp,
        ActionName::Delete,
    ];

    /// The broader type this action belongs to, used for config lookups
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionName::Fetch | ActionName::Stream => ActionType::Read,
            ActionName::Insert | ActionName::Merge | ActionName::Assign | ActionName::Replace => {
                ActionType::Write
            }
            ActionName::DeleteProp => ActionType::DeleteProp,
            ActionName::Delete => ActionType::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Fetch => "fetch",
            ActionName::Stream => "stream",
            ActionName::Insert => "insert",
            ActionName::Merge => "merge",
            ActionName::Assign => "assign",
            ActionName::Replace => "replace",
            ActionName::DeleteProp => "deleteProp",
            ActionName::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broader action categories that configuration can target instead of a
/// single action name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Read,
    Write,
    Delete,
    DeleteProp,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Read => "read",
            ActionType::Write => "write",
            ActionType::Delete => "delete",
            ActionType::DeleteProp => "deleteProp",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
