use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use crate::{
    display_name, Comment, CommentId, CommentView, SortOrder, VoteMagnitude, LOW_SCORE_THRESHOLD,
};

/// A stored comment along with its author's username, as loaded for one bill
#[derive(Clone, Debug)]
pub struct CommentRecord {
    pub comment: Comment,
    pub author_name: Option<String>,
}

/// Rebuild the threaded comment forest of one bill from its flat list of comments.
///
/// `scores` maps each comment to the sum of its vote ledger, missing entries
/// meaning no votes. Top-level comments are ordered by `sort`; replies are always
/// oldest first so that conversations read chronologically. Comments whose parent
/// is not part of `records` cannot be placed and are left out.
pub fn assemble_forest(
    records: Vec<CommentRecord>,
    scores: &HashMap<CommentId, i64>,
    viewer_votes: &HashMap<CommentId, VoteMagnitude>,
    sort: SortOrder,
) -> Vec<CommentView> {
    let known = records
        .iter()
        .map(|r| r.comment.id)
        .collect::<HashSet<CommentId>>();
    let mut children: HashMap<Option<CommentId>, Vec<CommentRecord>> = HashMap::new();
    for r in records {
        if let Some(parent) = r.comment.parent_comment_id {
            if !known.contains(&parent) {
                tracing::warn!(
                    comment = ?r.comment.id,
                    ?parent,
                    "comment has a parent outside of its bill, leaving it out"
                );
                continue;
            }
        }
        children
            .entry(r.comment.parent_comment_id)
            .or_default()
            .push(r);
    }

    let mut top = children.remove(&None).unwrap_or_default();
    sort_records(&mut top, sort, scores);
    top.into_iter()
        .map(|r| build_view(r, &mut children, scores, viewer_votes))
        .collect()
}

// Each record is removed from `children` when visited, so a malformed parent
// chain can never be walked twice.
fn build_view(
    record: CommentRecord,
    children: &mut HashMap<Option<CommentId>, Vec<CommentRecord>>,
    scores: &HashMap<CommentId, i64>,
    viewer_votes: &HashMap<CommentId, VoteMagnitude>,
) -> CommentView {
    let CommentRecord {
        comment,
        author_name,
    } = record;
    let mut replies = children.remove(&Some(comment.id)).unwrap_or_default();
    sort_records(&mut replies, SortOrder::DateAscending, scores);
    let replies = replies
        .into_iter()
        .map(|r| build_view(r, children, scores, viewer_votes))
        .collect();
    let vote_count = score_of(scores, comment.id);
    CommentView {
        username: String::from(display_name(author_name.as_deref())),
        vote_count,
        low_score: vote_count <= LOW_SCORE_THRESHOLD,
        user_vote: viewer_votes.get(&comment.id).copied(),
        id: comment.id,
        bill_id: comment.bill_id,
        user_id: comment.user_id,
        content: comment.content,
        date: comment.date,
        parent_comment_id: comment.parent_comment_id,
        replies,
    }
}

fn score_of(scores: &HashMap<CommentId, i64>, id: CommentId) -> i64 {
    scores.get(&id).copied().unwrap_or(0)
}

fn chronological(a: &CommentRecord, b: &CommentRecord) -> Ordering {
    (a.comment.date, a.comment.id).cmp(&(b.comment.date, b.comment.id))
}

fn sort_records(records: &mut [CommentRecord], sort: SortOrder, scores: &HashMap<CommentId, i64>) {
    match sort {
        SortOrder::DateAscending => records.sort_by(chronological),
        SortOrder::DateDescending => records.sort_by(|a, b| chronological(b, a)),
        SortOrder::ScoreDescending => records.sort_by(|a, b| {
            score_of(scores, b.comment.id)
                .cmp(&score_of(scores, a.comment.id))
                .then_with(|| chronological(b, a))
        }),
    }
}
