//! Caller resolution: `Auth-Token` header, `sessionid` cookie, or anonymous.
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use crashstats_core::{Caller, Permission, PermissionSet, TokenGrant, UserAccount};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

pub const AUTH_TOKEN_HEADER: &str = "auth-token";
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("API Token not matched")]
    TokenNotMatched,

    #[error("API Token found but expired")]
    TokenExpired,

    #[error("IDENTITY/LOAD: {0}")]
    Load(String),
}

/// Where users, sessions and tokens are looked up
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Token by key, with its owner as currently stored
    async fn token(&self, key: &str) -> Option<TokenGrant>;

    async fn session(&self, key: &str) -> Option<UserAccount>;
}

#[derive(Debug, Clone)]
struct StoredToken {
    id: u64,
    user_id: u64,
    permissions: PermissionSet,
    expires_at: Option<DateTime<Utc>>,
    notes: String,
}

#[derive(Debug, Default)]
struct Identities {
    users: HashMap<u64, UserAccount>,
    sessions: HashMap<String, u64>,
    tokens: HashMap<String, StoredToken>,
    next_token_id: u64,
}

/// Identity store held in memory, optionally seeded from YAML
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    inner: RwLock<Identities>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Identities> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Identities> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_user(&self, user: UserAccount) {
        self.write().users.insert(user.id, user);
    }

    pub fn grant(&self, user_id: u64, permission: Permission) {
        if let Some(user) = self.write().users.get_mut(&user_id) {
            user.permissions.insert(permission);
        }
    }

    pub fn set_active(&self, user_id: u64, active: bool) {
        if let Some(user) = self.write().users.get_mut(&user_id) {
            user.active = active;
        }
    }

    pub fn add_session(&self, key: impl Into<String>, user_id: u64) {
        self.write().sessions.insert(key.into(), user_id);
    }

    /// Issue a token for `user_id`; returns the token id
    pub fn add_token(
        &self,
        key: impl Into<String>,
        user_id: u64,
        permissions: PermissionSet,
        expires_at: Option<DateTime<Utc>>,
        notes: impl Into<String>,
    ) -> u64 {
        let mut inner = self.write();
        inner.next_token_id += 1;
        let id = inner.next_token_id;
        inner.tokens.insert(
            key.into(),
            StoredToken {
                id,
                user_id,
                permissions,
                expires_at,
                notes: notes.into(),
            },
        );
        id
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, IdentityError> {
        let file: IdentityFile =
            serde_yaml::from_str(yaml).map_err(|e| IdentityError::Load(e.to_string()))?;
        let store = Self::new();
        for user in file.users {
            for session in &user.sessions {
                store.add_session(session.clone(), user.id);
            }
            store.add_user(UserAccount {
                id: user.id,
                username: user.username,
                active: user.active,
                permissions: user.permissions.into_iter().collect(),
            });
        }
        for token in file.tokens {
            if !store.read().users.contains_key(&token.user_id) {
                return Err(IdentityError::Load(format!(
                    "token owner {} is not a known user",
                    token.user_id
                )));
            }
            store.add_token(
                token.key,
                token.user_id,
                token.permissions.into_iter().collect(),
                token.expires_at,
                token.notes,
            );
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| IdentityError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn token(&self, key: &str) -> Option<TokenGrant> {
        let inner = self.read();
        let stored = inner.tokens.get(key)?;
        let user = inner.users.get(&stored.user_id)?.clone();
        Some(TokenGrant {
            id: stored.id,
            user,
            permissions: stored.permissions.clone(),
            expires_at: stored.expires_at,
            notes: stored.notes.clone(),
        })
    }

    async fn session(&self, key: &str) -> Option<UserAccount> {
        let inner = self.read();
        let user_id = inner.sessions.get(key)?;
        inner.users.get(user_id).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct IdentityFile {
    #[serde(default)]
    users: Vec<UserEntry>,
    #[serde(default)]
    tokens: Vec<TokenEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: u64,
    username: String,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    sessions: Vec<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    key: String,
    user_id: u64,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    notes: String,
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Resolve who is calling.
///
/// A presented token must match and be unexpired; a session cookie that
/// matches nothing is treated as no cookie at all.
pub async fn resolve_caller(
    store: &dyn IdentityStore,
    headers: &HeaderMap,
    ip: IpAddr,
    now: DateTime<Utc>,
) -> Result<Caller, IdentityError> {
    if let Some(key) = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        let grant = store.token(key).await.ok_or(IdentityError::TokenNotMatched)?;
        if grant.is_expired(now) {
            return Err(IdentityError::TokenExpired);
        }
        return Ok(Caller::Token { grant, ip });
    }

    if let Some(session) = cookie(headers, SESSION_COOKIE) {
        if let Some(account) = store.session(session).await {
            return Ok(Caller::User { account, ip });
        }
    }

    Ok(Caller::anonymous(ip))
}
