//! Permission codenames understood by the gateway.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single grantable permission.
///
/// Serialized as its codename (`view_pii`, ...) so identity files and
/// documentation read the same way operators write them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewPii,
    ViewExploitability,
    ViewRawdump,
    ReprocessCrashes,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::ViewPii,
        Permission::ViewExploitability,
        Permission::ViewRawdump,
        Permission::ReprocessCrashes,
    ];

    /// Machine codename
    pub fn codename(&self) -> &'static str {
        match self {
            Permission::ViewPii => "view_pii",
            Permission::ViewExploitability => "view_exploitability",
            Permission::ViewRawdump => "view_rawdump",
            Permission::ReprocessCrashes => "reprocess_crashes",
        }
    }

    /// Human-readable name, used in 403 reasons
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ViewPii => "View personal identifiable information",
            Permission::ViewExploitability => "View Exploitability Results",
            Permission::ViewRawdump => "View Raw Dumps",
            Permission::ReprocessCrashes => "Reprocess Crashes",
        }
    }

    pub fn from_codename(codename: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.codename() == codename)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

/// An ordered set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, permission: Permission) -> Self {
        self.0.insert(permission);
        self
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permissions present in both sets
    pub fn intersection(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet(self.0.intersection(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        PermissionSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codename_roundtrip() {
        for permission in Permission::ALL {
            assert_eq!(Permission::from_codename(permission.codename()), Some(permission));
        }
        assert_eq!(Permission::from_codename("view_everything"), None);
    }

    #[test]
    fn test_intersection() {
        let a = PermissionSet::new()
            .with(Permission::ViewPii)
            .with(Permission::ViewExploitability);
        let b = PermissionSet::new().with(Permission::ViewPii);

        let both = a.intersection(&b);
        assert!(both.contains(Permission::ViewPii));
        assert!(!both.contains(Permission::ViewExploitability));
    }

    #[test]
    fn test_serializes_as_codenames() {
        let set = PermissionSet::new().with(Permission::ViewRawdump);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["view_rawdump"]"#);
    }
}
