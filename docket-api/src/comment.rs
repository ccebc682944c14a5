use std::str::FromStr;

use crate::{BillId, Error, Time, UserId};

/// Longest accepted comment body, counted in characters
pub const MAX_COMMENT_LEN: usize = 10_000;

/// Replies nest at most this many levels below a top-level comment
pub const MAX_REPLY_DEPTH: usize = 32;

/// Comments scoring at or below this are collapsed by clients
pub const LOW_SCORE_THRESHOLD: i64 = -1;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub bill_id: BillId,
    pub user_id: Option<UserId>,
    pub content: String,
    pub date: Time,
    pub parent_comment_id: Option<CommentId>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub bill_id: BillId,
    #[serde(default)]
    pub content: String,
    pub parent_comment_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::Validation(String::from(
                "billId and content are required",
            )));
        }
        if self.content.chars().count() > MAX_COMMENT_LEN {
            return Err(Error::Validation(String::from("Comment is too long.")));
        }
        Ok(())
    }
}

/// A single up or down vote, serialized as `1` or `-1`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteMagnitude {
    Up,
    Down,
}

impl VoteMagnitude {
    pub fn value(self) -> i64 {
        match self {
            VoteMagnitude::Up => 1,
            VoteMagnitude::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteMagnitude {
    type Error = Error;

    fn try_from(v: i64) -> Result<VoteMagnitude, Error> {
        match v {
            1 => Ok(VoteMagnitude::Up),
            -1 => Ok(VoteMagnitude::Down),
            _ => Err(Error::Validation(format!("voteType must be 1 or -1, got {v}"))),
        }
    }
}

impl From<VoteMagnitude> for i64 {
    fn from(v: VoteMagnitude) -> i64 {
        v.value()
    }
}

#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentVote {
    pub comment_id: CommentId,
    pub vote_type: VoteMagnitude,
}

/// Score of a comment right after one of its votes changed
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentScore {
    pub comment_id: CommentId,
    pub vote_count: i64,
    pub user_vote: Option<VoteMagnitude>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    DateDescending,
    DateAscending,
    ScoreDescending,
}

impl SortOrder {
    pub fn as_query_str(&self) -> &'static str {
        match self {
            SortOrder::DateDescending => "new",
            SortOrder::DateAscending => "old",
            SortOrder::ScoreDescending => "best",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<SortOrder, Error> {
        match s {
            "new" => Ok(SortOrder::DateDescending),
            "old" => Ok(SortOrder::DateAscending),
            "best" => Ok(SortOrder::ScoreDescending),
            _ => Err(Error::Validation(format!(
                "unknown sort order {s:?}, expected new, old or best"
            ))),
        }
    }
}

/// A comment as shown to clients: author name, score and replies resolved
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: CommentId,
    pub bill_id: BillId,
    pub user_id: Option<UserId>,
    pub content: String,
    pub date: Time,
    pub parent_comment_id: Option<CommentId>,
    pub username: String,
    pub vote_count: i64,
    pub low_score: bool,
    /// Vote of the user who requested this view, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<VoteMagnitude>,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    /// Number of comments in this thread, this one included
    pub fn thread_len(&self) -> usize {
        1 + self.replies.iter().map(|r| r.thread_len()).sum::<usize>()
    }
}
