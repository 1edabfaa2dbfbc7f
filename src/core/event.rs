//! Watch notifications and the path they are scoped to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a change reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchAction {
    /// A node was created or overwritten.
    Set,
    /// A node was removed.
    Delete,
    /// Any other tag the store may send (`expire`, `compareAndSwap`, ...).
    Other(String),
}

impl WatchAction {
    /// Parse the store's action tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "set" => Self::Set,
            "delete" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    /// The tag as the store spells it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for WatchAction {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}

impl fmt::Display for WatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification from the distributed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened to the node.
    pub action: WatchAction,
    /// Full path of the changed node.
    pub key: String,
    /// Raw payload; empty on delete.
    pub value: String,
}

impl WatchEvent {
    /// Create an event with an arbitrary action.
    pub fn new(action: impl Into<WatchAction>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// A `set` notification.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(WatchAction::Set, key, value)
    }

    /// A `delete` notification with an empty payload.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(WatchAction::Delete, key, String::new())
    }
}

/// The subtree a member watches: `<members_prefix>/<member-id>/<config_dir>`.
///
/// Always watched recursively; individual monitors live as its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedWatchPath {
    path: String,
    config_dir: String,
}

impl ScopedWatchPath {
    /// Build the scope for a member. Leading and trailing slashes on the prefix
    /// are dropped.
    pub fn new(members_prefix: &str, member_id: &str, config_dir: &str) -> Self {
        let prefix = members_prefix.trim_matches('/');
        Self {
            path: format!("{}/{}/{}", prefix, member_id, config_dir),
            config_dir: config_dir.to_string(),
        }
    }

    /// Scope under the default `cluster/members/<member-id>/config` layout.
    pub fn for_member(member_id: &str) -> Self {
        Self::new(
            crate::settings::DEFAULT_MEMBERS_PREFIX,
            member_id,
            crate::settings::DEFAULT_CONFIG_DIR,
        )
    }

    /// The full watched path.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Name of the config container node.
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Whether `key` is the watched node or one of its descendants.
    ///
    /// A leading `/` on the key is tolerated since stores differ on whether
    /// they report absolute keys.
    pub fn contains(&self, key: &str) -> bool {
        let key = key.trim_start_matches('/');
        match key.strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Key of a child entry under this scope.
    pub fn child(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }
}

impl fmt::Display for ScopedWatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(WatchAction::parse("set"), WatchAction::Set);
        assert_eq!(WatchAction::parse("delete"), WatchAction::Delete);
        assert_eq!(WatchAction::parse("expire"), WatchAction::Other("expire".into()));
        assert_eq!(WatchAction::parse("expire").to_string(), "expire");
    }

    #[test]
    fn test_scope_layout() {
        let scope = ScopedWatchPath::for_member("node-7");
        assert_eq!(scope.as_str(), "cluster/members/node-7/config");
        assert_eq!(scope.config_dir(), "config");
        assert_eq!(scope.child("disk-1"), "cluster/members/node-7/config/disk-1");
    }

    #[test]
    fn test_scope_contains() {
        let scope = ScopedWatchPath::for_member("m1");
        assert!(scope.contains("cluster/members/m1/config"));
        assert!(scope.contains("/cluster/members/m1/config/http-check-1"));
        assert!(scope.contains("cluster/members/m1/config/a/b"));
        assert!(!scope.contains("cluster/members/m1/configs"));
        assert!(!scope.contains("cluster/members/m2/config/http-check-1"));
        assert!(!scope.contains(""));
    }
}
