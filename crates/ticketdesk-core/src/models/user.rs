use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Role carried in the credential claims and on the user record.
///
/// The core treats roles as opaque labels; ordering and permissions are
/// decided server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PlatformAdmin,
    CompanyAdmin,
    Engineer,
    Requester,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::PlatformAdmin => write!(f, "Platform Admin"),
            Role::CompanyAdmin => write!(f, "Company Admin"),
            Role::Engineer => write!(f, "Engineer"),
            Role::Requester => write!(f, "Requester"),
        }
    }
}

/// Denormalized user record returned by the login and `/auth/me` endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
    /// Tenant the user belongs to. Platform admins may have none.
    #[serde(default)]
    pub company_id: Option<String>,
}

impl User {
    /// Name for display, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}
