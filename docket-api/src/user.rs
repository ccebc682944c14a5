use uuid::Uuid;

use crate::Error;

/// Name shown for comments without an author, or whose author has no username
pub const ANONYMOUS: &str = "Anonymous";

const MAX_USERNAME_LEN: usize = 64;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        display_name(self.username.as_deref())
    }
}

pub fn display_name(username: Option<&str>) -> &str {
    match username {
        Some(name) if !name.trim().is_empty() => name,
        _ => ANONYMOUS,
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub username: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.username {
            if name.trim().is_empty() {
                return Err(Error::Validation(String::from("username cannot be blank")));
            }
            if name.chars().count() > MAX_USERNAME_LEN {
                return Err(Error::Validation(format!(
                    "username is longer than {MAX_USERNAME_LEN} characters"
                )));
            }
            if name.chars().any(|c| c.is_control()) {
                return Err(Error::Validation(String::from(
                    "username contains control characters",
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub user_id: UserId,
}
