//! User and contact models

use serde::{Deserialize, Serialize};

const DEFAULT_ROLE: &str = "USER";

/// User rendered as a chat participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

/// User record as returned by the backend (`/users`, `/auth/me`, contacts).
///
/// Every field except `id` is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Map a backend user onto a contact.
///
/// name: `name`, else `firstName lastName`, else the email local part, else the id.
/// email: as given, else empty. role: uppercased, else `USER`.
/// userType: kept when non-empty.
pub fn contact_from_user(user: BackendUser) -> Contact {
    let email = non_empty(user.email.as_deref()).unwrap_or("").to_string();

    let full_name = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .filter_map(non_empty)
        .collect::<Vec<_>>()
        .join(" ");

    let name = non_empty(user.name.as_deref())
        .map(String::from)
        .or_else(|| (!full_name.is_empty()).then_some(full_name))
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| user.id.clone());

    let role = non_empty(user.role.as_deref())
        .map(str::to_uppercase)
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());

    Contact {
        id: user.id,
        name,
        email,
        role,
        user_type: non_empty(user.user_type.as_deref()).map(String::from),
    }
}
