//! The signed-in user as the client sees it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Numeric role id the backend uses for administrators.
pub const ADMIN_ROLE_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    /// Map the backend's `id_rol`; anything but 1 (or no role) is a member
    pub fn from_id(id: Option<i64>) -> Self {
        match id {
            Some(ADMIN_ROLE_ID) => Role::Admin,
            _ => Role::Member,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fill fields this record lacks from another view of the same user
    pub fn merged_with(mut self, other: &User) -> User {
        if self.id.is_none() {
            self.id = other.id.clone();
        }
        if self.email.is_none() {
            self.email = other.email.clone();
        }
        if self.display_name.is_none() {
            self.display_name = other.display_name.clone();
        }
        self
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("<unknown>");
        write!(f, "{} ({})", name, self.role.as_str())
    }
}

/// The `usuario` record of a login response. Field names follow the
/// backend; ids may arrive as numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    id_usuario: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_role")]
    pub id_rol: Option<Role>,
}

impl UserRecord {
    /// `id_usuario` when present, else `id`
    pub fn user_id(&self) -> Option<&str> {
        self.id_usuario.as_deref().or(self.id.as_deref())
    }
}

/// Accept `"12"`, `12` or null for an id field
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Only the integer 1 is admin. Any other value is a member; null or a
/// missing key leaves the role unknown.
pub(crate) fn de_opt_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(Role::from_id(n.as_i64())),
        Some(_) => Some(Role::Member),
    })
}
