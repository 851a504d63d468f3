//! Resolved identity of an inbound request.

use crate::permission::{Permission, PermissionSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

fn default_true() -> bool {
    true
}

/// A user account as known to the identity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub username: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl UserAccount {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            active: true,
            permissions: PermissionSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

/// An API token together with the current state of its owning user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub id: u64,
    pub user: UserAccount,
    pub permissions: PermissionSet,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl TokenGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Who is calling.
///
/// Every variant remembers the client address so that callers without a
/// usable identity can still be rate limited by IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous { ip: IpAddr },
    User { account: UserAccount, ip: IpAddr },
    Token { grant: TokenGrant, ip: IpAddr },
}

impl Caller {
    pub fn anonymous(ip: IpAddr) -> Self {
        Caller::Anonymous { ip }
    }

    pub fn ip(&self) -> IpAddr {
        match self {
            Caller::Anonymous { ip } | Caller::User { ip, .. } | Caller::Token { ip, .. } => *ip,
        }
    }

    /// Permissions this request may actually exercise.
    ///
    /// A token only ever carries the overlap of its own grants and its
    /// owner's, and nothing at all once the owner is deactivated.
    pub fn effective_permissions(&self) -> PermissionSet {
        match self {
            Caller::Anonymous { .. } => PermissionSet::new(),
            Caller::User { account, .. } => {
                if account.active {
                    account.permissions.clone()
                } else {
                    PermissionSet::new()
                }
            }
            Caller::Token { grant, .. } => {
                if grant.user.active {
                    grant.permissions.intersection(&grant.user.permissions)
                } else {
                    PermissionSet::new()
                }
            }
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.effective_permissions().contains(permission)
    }

    /// True for an active user or a token whose owner is active
    pub fn is_authenticated(&self) -> bool {
        match self {
            Caller::Anonymous { .. } => false,
            Caller::User { account, .. } => account.active,
            Caller::Token { grant, .. } => grant.user.active,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Caller::Token { .. }) && self.is_authenticated()
    }

    /// Key under which requests from this caller are counted
    pub fn rate_key(&self) -> String {
        match self {
            Caller::User { account, .. } if account.active => format!("user:{}", account.id),
            Caller::Token { grant, .. } if grant.user.active => format!("token:{}", grant.id),
            other => format!("ip:{}", other.ip()),
        }
    }

    /// Short label for logs; never includes token material
    pub fn label(&self) -> String {
        match self {
            Caller::Anonymous { ip } => format!("anonymous@{}", ip),
            Caller::User { account, .. } => format!("user:{}", account.username),
            Caller::Token { grant, .. } => format!("token:{}({})", grant.id, grant.user.username),
        }
    }
}
