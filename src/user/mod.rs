//! Users, roles and the authentication principal built on them.
mod repository;

pub use repository::*;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix added to a role name to form a granted authority.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Kind of role a user may hold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    /// Maintains orders and products.
    Editor,
    /// Works through orders on the floor.
    Operator,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Editor => "EDITOR",
            RoleName::Operator => "OPERATOR",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role as saved on database.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: RoleName,
}

/// Authority granted to a principal, e.g. `ROLE_OPERATOR`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GrantedAuthority(String);

impl GrantedAuthority {
    pub fn new(authority: impl Into<String>) -> Self {
        Self(authority.into())
    }

    /// Authority derived from a role.
    pub fn from_role(role: RoleName) -> Self {
        Self(format!("{ROLE_PREFIX}{role}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantedAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated identity contract.
pub trait Principal {
    /// Credential, as a PHC hash.
    fn password(&self) -> &str;
    /// Principal name.
    fn username(&self) -> &str;
    /// Granted authorities, without duplicates.
    fn authorities(&self) -> HashSet<GrantedAuthority>;
    fn is_account_non_expired(&self) -> bool;
    fn is_account_non_locked(&self) -> bool;
    fn is_credentials_non_expired(&self) -> bool;
    fn is_enabled(&self) -> bool;

    /// Whether every account status predicate holds.
    fn is_usable(&self) -> bool {
        self.is_account_non_expired()
            && self.is_account_non_locked()
            && self.is_credentials_non_expired()
            && self.is_enabled()
    }
}

/// User as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct User {
    id: i64,
    pub username: String,
    #[serde(skip)]
    pub password: String,
    #[sqlx(json)]
    pub roles: HashSet<Role>,
}

impl User {
    /// Create a new, not yet persisted, [`User`] without roles.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: 0,
            username: username.into(),
            password: password.into(),
            roles: HashSet::new(),
        }
    }

    /// Identifier assigned by the database.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn set_roles(&mut self, roles: HashSet<Role>) {
        self.roles = roles;
    }

    /// Whether one of `authorities` has been granted.
    pub fn has_any_authority(&self, authorities: &[GrantedAuthority]) -> bool {
        let granted = self.authorities();
        authorities.iter().any(|a| granted.contains(a))
    }
}

impl Principal for User {
    fn password(&self) -> &str {
        &self.password
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn authorities(&self) -> HashSet<GrantedAuthority> {
        self.roles
            .iter()
            .map(|role| GrantedAuthority::from_role(role.name))
            .collect()
    }

    fn is_account_non_expired(&self) -> bool {
        true
    }

    fn is_account_non_locked(&self) -> bool {
        true
    }

    fn is_credentials_non_expired(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
