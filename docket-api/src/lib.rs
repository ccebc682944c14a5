use chrono::Utc;

mod bill;
mod comment;
mod error;
mod forest;
mod user;

pub use bill::{Bill, BillId, BillVote, BillVoteTally, BillVoteType, NewBill, NewBillVote};
pub use comment::{
    Comment, CommentId, CommentScore, CommentView, NewComment, NewCommentVote, SortOrder,
    VoteMagnitude, LOW_SCORE_THRESHOLD, MAX_COMMENT_LEN, MAX_REPLY_DEPTH,
};
pub use error::Error;
pub use forest::{assemble_forest, CommentRecord};
pub use user::{display_name, AuthToken, NewSession, NewUser, User, UserId, ANONYMOUS};
pub use uuid::Uuid;

pub type Time = chrono::DateTime<Utc>;

/// 1-based page selection. No `limit` means no pagination at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl Pagination {
    pub fn validate(&self) -> Result<(), Error> {
        if self.page == Some(0) {
            return Err(Error::Validation(String::from("page numbers start at 1")));
        }
        if self.limit == Some(0) {
            return Err(Error::Validation(String::from("limit must be positive")));
        }
        Ok(())
    }

    /// `(offset, limit)` to feed an SQL `LIMIT ? OFFSET ?` clause. Offsets past
    /// `i64::MAX` are clamped, which selects nothing anyway.
    pub fn offset_limit(&self) -> Option<(i64, i64)> {
        let limit = u64::from(self.limit?);
        let page = u64::from(self.page.unwrap_or(1).max(1));
        let offset = (page - 1).saturating_mul(limit);
        Some((
            i64::try_from(offset).unwrap_or(i64::MAX),
            i64::try_from(limit).unwrap_or(i64::MAX),
        ))
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.offset_limit() {
            None => items,
            Some((offset, limit)) => items
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
        }
    }
}
