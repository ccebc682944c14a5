use anyhow::{anyhow, Context};
use serde_json::json;

use crate::{BillId, CommentId, UserId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Bill not found {0:?}")]
    BillNotFound(BillId),

    #[error("User not found {0:?}")]
    UserNotFound(UserId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Request timed out")]
    Timeout,
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::BillNotFound(_) => StatusCode::NOT_FOUND,
            Error::UserNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthorized => json!({
                "message": "authentication required",
                "type": "unauthorized",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::Validation(msg) => json!({
                "message": msg,
                "type": "validation",
            }),
            Error::BillNotFound(id) => json!({
                "message": "bill not found",
                "type": "bill-not-found",
                "id": id,
            }),
            Error::UserNotFound(id) => json!({
                "message": "user not found",
                "type": "user-not-found",
                "id": id,
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::Timeout => json!({
                "message": "the request took too long, please try again later",
                "type": "timeout",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let message = || {
            String::from(
                data.get("message")
                    .and_then(|msg| msg.as_str())
                    .unwrap_or(""),
            )
        };
        let id = || {
            data.get("id")
                .and_then(|id| id.as_i64())
                .ok_or_else(|| anyhow!("not-found error without a numeric id"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(message()),
                "unauthorized" => Error::Unauthorized,
                "permission-denied" => Error::PermissionDenied,
                "validation" => Error::Validation(message()),
                "bill-not-found" => Error::BillNotFound(BillId(id()?)),
                "user-not-found" => Error::UserNotFound(UserId(id()?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(id()?)),
                "conflict-name" => Error::NameAlreadyUsed(String::from(
                    data.get("name")
                        .and_then(|n| n.as_str())
                        .ok_or_else(|| anyhow!("error is a name conflict without a name"))?,
                )),
                "timeout" => Error::Timeout,
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
