use std::collections::HashMap;

use anyhow::Context;
use docket_api::{
    AuthToken, Bill, BillId, BillVote, BillVoteTally, BillVoteType, Comment, CommentId,
    CommentRecord, CommentScore, CommentView, Error as ApiError, NewBill, NewBillVote,
    NewComment, NewUser, Pagination, SortOrder, Time, User, UserId, Uuid, VoteMagnitude,
    MAX_REPLY_DEPTH,
};
use futures::TryStreamExt;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use crate::Error;

const COMMENT_FIELDS: &str = "c.id, c.bill_id, c.user_id, c.content, c.date, c.parent_comment_id";

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        bill_id: BillId(row.try_get("bill_id").context("retrieving the bill_id field")?),
        user_id: row
            .try_get::<Option<i64>, _>("user_id")
            .context("retrieving the user_id field")?
            .map(UserId),
        content: row
            .try_get("content")
            .context("retrieving the content field")?,
        date: row.try_get("date").context("retrieving the date field")?,
        parent_comment_id: row
            .try_get::<Option<i64>, _>("parent_comment_id")
            .context("retrieving the parent_comment_id field")?
            .map(CommentId),
    })
}

fn bill_from_row(row: &SqliteRow) -> anyhow::Result<Bill> {
    Ok(Bill {
        id: BillId(row.try_get("id").context("retrieving the id field")?),
        bill_number: row
            .try_get("bill_number")
            .context("retrieving the bill_number field")?,
        title: row.try_get("title").context("retrieving the title field")?,
        summary: row
            .try_get("summary")
            .context("retrieving the summary field")?,
        date: row.try_get("date").context("retrieving the date field")?,
        link: row.try_get("link").context("retrieving the link field")?,
    })
}

// Users and sessions

pub async fn create_user(
    conn: &mut SqliteConnection,
    data: &NewUser,
) -> anyhow::Result<Result<UserId, ApiError>> {
    if let Err(e) = data.validate() {
        return Ok(Err(e));
    }
    if let Some(name) = &data.username {
        let taken = sqlx::query("SELECT id FROM users WHERE username = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("checking whether username {name:?} is taken"))?;
        if taken.is_some() {
            return Ok(Err(ApiError::NameAlreadyUsed(name.clone())));
        }
    }
    let res = sqlx::query("INSERT INTO users (username) VALUES (?)")
        .bind(&data.username)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting user {:?}", data.username))?;
    Ok(Ok(UserId(res.last_insert_rowid())))
}

pub async fn get_user(conn: &mut SqliteConnection, user: UserId) -> anyhow::Result<Option<User>> {
    let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
        .bind(user.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching user {:?}", user))?;
    row.map(|r| {
        Ok(User {
            id: UserId(r.try_get("id").context("retrieving the id field")?),
            username: r
                .try_get("username")
                .context("retrieving the username field")?,
        })
    })
    .transpose()
}

pub async fn create_session(
    conn: &mut SqliteConnection,
    user: UserId,
) -> anyhow::Result<Result<AuthToken, ApiError>> {
    if get_user(&mut *conn, user).await?.is_none() {
        return Ok(Err(ApiError::UserNotFound(user)));
    }
    let token = AuthToken(Uuid::new_v4());
    sqlx::query("INSERT INTO sessions (token, user_id) VALUES (?, ?)")
        .bind(token.0.to_string())
        .bind(user.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting session for user {:?}", user))?;
    Ok(Ok(token))
}

pub async fn recover_session(
    conn: &mut SqliteConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE token = ?")
        .bind(token.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("recovering session")?
        .ok_or_else(Error::permission_denied)?;
    Ok(UserId(
        row.try_get("user_id")
            .context("retrieving the user_id field")?,
    ))
}

// Bills

pub async fn create_bill(conn: &mut SqliteConnection, data: &NewBill) -> anyhow::Result<Bill> {
    let res = sqlx::query(
        "INSERT INTO bills (bill_number, title, summary, date, link) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&data.bill_number)
    .bind(&data.title)
    .bind(&data.summary)
    .bind(data.date)
    .bind(&data.link)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting bill {:?}", data.bill_number))?;
    Ok(Bill {
        id: BillId(res.last_insert_rowid()),
        bill_number: data.bill_number.clone(),
        title: data.title.clone(),
        summary: data.summary.clone(),
        date: data.date,
        link: data.link.clone(),
    })
}

pub async fn list_bills(conn: &mut SqliteConnection) -> anyhow::Result<Vec<Bill>> {
    let mut res = Vec::new();
    let mut rows = sqlx::query(
        "SELECT id, bill_number, title, summary, date, link FROM bills ORDER BY date DESC, id DESC",
    )
    .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying bills table")? {
        res.push(bill_from_row(&row)?);
    }
    Ok(res)
}

pub async fn get_bill(conn: &mut SqliteConnection, bill: BillId) -> anyhow::Result<Option<Bill>> {
    sqlx::query("SELECT id, bill_number, title, summary, date, link FROM bills WHERE id = ?")
        .bind(bill.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching bill {:?}", bill))?
        .map(|r| bill_from_row(&r))
        .transpose()
}

pub async fn bill_exists(conn: &mut SqliteConnection, bill: BillId) -> anyhow::Result<bool> {
    Ok(sqlx::query("SELECT id FROM bills WHERE id = ?")
        .bind(bill.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("checking existence of bill {:?}", bill))?
        .is_some())
}

/// Known voters have a single vote per bill that they can change; anonymous
/// votes are always new rows.
pub async fn cast_bill_vote(
    conn: &mut SqliteConnection,
    voter: Option<UserId>,
    data: &NewBillVote,
) -> anyhow::Result<Result<BillVote, ApiError>> {
    if !bill_exists(&mut *conn, data.bill_id).await? {
        return Ok(Err(ApiError::BillNotFound(data.bill_id)));
    }
    let id = match voter {
        Some(user) => {
            if get_user(&mut *conn, user).await?.is_none() {
                return Ok(Err(ApiError::UserNotFound(user)));
            }
            sqlx::query(
                "
                    INSERT INTO bill_votes (bill_id, user_id, vote_type)
                    VALUES (?, ?, ?)
                    ON CONFLICT (user_id, bill_id) DO UPDATE SET vote_type = excluded.vote_type
                ",
            )
            .bind(data.bill_id.0)
            .bind(user.0)
            .bind(data.vote_type.as_str())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("upserting vote of {:?} on {:?}", user, data.bill_id))?;
            sqlx::query("SELECT id FROM bill_votes WHERE user_id = ? AND bill_id = ?")
                .bind(user.0)
                .bind(data.bill_id.0)
                .fetch_one(&mut *conn)
                .await
                .with_context(|| format!("reading back vote of {:?} on {:?}", user, data.bill_id))?
                .try_get("id")
                .context("retrieving the id field")?
        }
        None => {
            sqlx::query("INSERT INTO bill_votes (bill_id, user_id, vote_type) VALUES (?, NULL, ?)")
                .bind(data.bill_id.0)
                .bind(data.vote_type.as_str())
                .execute(&mut *conn)
                .await
                .with_context(|| format!("inserting anonymous vote on {:?}", data.bill_id))?
                .last_insert_rowid()
        }
    };
    Ok(Ok(BillVote {
        id,
        bill_id: data.bill_id,
        user_id: voter,
        vote_type: data.vote_type,
    }))
}

pub async fn bill_vote_tally(
    conn: &mut SqliteConnection,
    bill: BillId,
) -> anyhow::Result<Result<BillVoteTally, ApiError>> {
    if !bill_exists(&mut *conn, bill).await? {
        return Ok(Err(ApiError::BillNotFound(bill)));
    }
    let mut tally = BillVoteTally::empty(bill);
    let mut rows = sqlx::query(
        "SELECT vote_type, COUNT(*) AS count FROM bill_votes WHERE bill_id = ? GROUP BY vote_type",
    )
    .bind(bill.0)
    .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying bill_votes table")? {
        let vote_type: String = row
            .try_get("vote_type")
            .context("retrieving the vote_type field")?;
        let vote_type = vote_type
            .parse::<BillVoteType>()
            .map_err(|_| anyhow::anyhow!("bill_votes has unknown vote_type {vote_type:?}"))?;
        tally.add(
            vote_type,
            row.try_get("count").context("retrieving the count field")?,
        );
    }
    Ok(Ok(tally))
}

// Comment store

pub async fn get_comment(
    conn: &mut SqliteConnection,
    comment: CommentId,
) -> anyhow::Result<Option<Comment>> {
    sqlx::query(&format!("SELECT {COMMENT_FIELDS} FROM comments c WHERE c.id = ?"))
        .bind(comment.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching comment {:?}", comment))?
        .map(|r| comment_from_row(&r))
        .transpose()
}

pub async fn create_comment(
    conn: &mut SqliteConnection,
    author: Option<UserId>,
    data: &NewComment,
    date: Time,
) -> anyhow::Result<Result<Comment, ApiError>> {
    if let Err(e) = data.validate() {
        return Ok(Err(e));
    }
    if !bill_exists(&mut *conn, data.bill_id).await? {
        return Ok(Err(ApiError::BillNotFound(data.bill_id)));
    }
    if let Some(user) = author {
        if get_user(&mut *conn, user).await?.is_none() {
            return Ok(Err(ApiError::UserNotFound(user)));
        }
    }
    if let Some(parent) = data.parent_comment_id {
        match get_comment(&mut *conn, parent).await? {
            None => return Ok(Err(ApiError::CommentNotFound(parent))),
            Some(p) if p.bill_id != data.bill_id => {
                return Ok(Err(ApiError::Validation(String::from(
                    "parent comment belongs to another bill",
                ))))
            }
            Some(_) => (),
        }
        let depth = reply_depth(&mut *conn, parent).await?;
        if depth > MAX_REPLY_DEPTH {
            return Ok(Err(ApiError::Validation(format!(
                "replies cannot nest more than {MAX_REPLY_DEPTH} levels deep"
            ))));
        }
    }
    let res = sqlx::query(
        "
            INSERT INTO comments (bill_id, user_id, content, date, parent_comment_id)
            VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(data.bill_id.0)
    .bind(author.map(|u| u.0))
    .bind(&data.content)
    .bind(date)
    .bind(data.parent_comment_id.map(|c| c.0))
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting comment on {:?}", data.bill_id))?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "insertion of comment on {:?} affected {} rows",
        data.bill_id,
        res.rows_affected()
    );
    Ok(Ok(Comment {
        id: CommentId(res.last_insert_rowid()),
        bill_id: data.bill_id,
        user_id: author,
        content: data.content.clone(),
        date,
        parent_comment_id: data.parent_comment_id,
    }))
}

/// Nesting level of a new reply to `parent`, that is the length of the chain
/// from `parent` up to its top-level ancestor
async fn reply_depth(conn: &mut SqliteConnection, parent: CommentId) -> anyhow::Result<usize> {
    let depth: i64 = sqlx::query(
        "
            WITH RECURSIVE ancestors (id, parent_comment_id) AS (
                SELECT id, parent_comment_id FROM comments WHERE id = ?
                UNION ALL
                SELECT c.id, c.parent_comment_id
                    FROM comments c
                INNER JOIN ancestors a
                    ON c.id = a.parent_comment_id
            )
            SELECT COUNT(*) AS depth FROM ancestors
        ",
    )
    .bind(parent.0)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("measuring reply depth under {:?}", parent))?
    .try_get("depth")
    .context("retrieving the depth field")?;
    usize::try_from(depth).with_context(|| format!("reply chain has depth {depth}"))
}

/// Comments of `bill` directly under `parent`, or its top-level comments if `parent` is `None`
pub async fn list_direct_children(
    conn: &mut SqliteConnection,
    bill: BillId,
    parent: Option<CommentId>,
    sort: SortOrder,
) -> anyhow::Result<Vec<Comment>> {
    let order = match sort {
        SortOrder::DateDescending => "c.date DESC, c.id DESC",
        SortOrder::DateAscending => "c.date ASC, c.id ASC",
        SortOrder::ScoreDescending => "COALESCE(SUM(v.vote_type), 0) DESC, c.date DESC, c.id DESC",
    };
    let query = format!(
        "
            SELECT {COMMENT_FIELDS}
                FROM comments c
            LEFT JOIN comment_votes v
                ON v.comment_id = c.id
            WHERE c.bill_id = ?
            AND c.parent_comment_id IS ?
            GROUP BY c.id
            ORDER BY {order}
        "
    );
    let mut res = Vec::new();
    let mut rows = sqlx::query(&query)
        .bind(bill.0)
        .bind(parent.map(|p| p.0))
        .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying comments table")? {
        res.push(comment_from_row(&row)?);
    }
    Ok(res)
}

/// All comments of `bill` in one go, along with their author's username
pub async fn fetch_comments_for_bill(
    conn: &mut SqliteConnection,
    bill: BillId,
) -> anyhow::Result<Vec<CommentRecord>> {
    let query = format!(
        "
            SELECT {COMMENT_FIELDS}, u.username
                FROM comments c
            LEFT JOIN users u
                ON u.id = c.user_id
            WHERE c.bill_id = ?
        "
    );
    let mut res = Vec::new();
    let mut rows = sqlx::query(&query).bind(bill.0).fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying comments table")? {
        res.push(CommentRecord {
            comment: comment_from_row(&row)?,
            author_name: row
                .try_get("username")
                .context("retrieving the username field")?,
        });
    }
    Ok(res)
}

pub async fn comments_by_user(
    conn: &mut SqliteConnection,
    user: UserId,
    page: &Pagination,
) -> anyhow::Result<Result<Vec<Comment>, ApiError>> {
    if let Err(e) = page.validate() {
        return Ok(Err(e));
    }
    if get_user(&mut *conn, user).await?.is_none() {
        return Ok(Err(ApiError::UserNotFound(user)));
    }
    // LIMIT -1 means no limit in sqlite
    let (offset, limit) = page.offset_limit().unwrap_or((0, -1));
    let query = format!(
        "
            SELECT {COMMENT_FIELDS}
                FROM comments c
            WHERE c.user_id = ?
            ORDER BY c.date DESC, c.id DESC
            LIMIT ? OFFSET ?
        "
    );
    let mut res = Vec::new();
    let mut rows = sqlx::query(&query)
        .bind(user.0)
        .bind(limit)
        .bind(offset)
        .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying comments table")? {
        res.push(comment_from_row(&row)?);
    }
    Ok(Ok(res))
}

// Vote ledger

/// Record `voter`'s stance on `comment`, replacing any earlier vote of theirs
pub async fn cast_comment_vote(
    conn: &mut SqliteConnection,
    comment: CommentId,
    voter: UserId,
    vote: VoteMagnitude,
) -> anyhow::Result<Result<(), ApiError>> {
    if get_comment(&mut *conn, comment).await?.is_none() {
        return Ok(Err(ApiError::CommentNotFound(comment)));
    }
    sqlx::query(
        "
            INSERT INTO comment_votes (comment_id, user_id, vote_type)
            VALUES (?, ?, ?)
            ON CONFLICT (comment_id, user_id) DO UPDATE SET vote_type = excluded.vote_type
        ",
    )
    .bind(comment.0)
    .bind(voter.0)
    .bind(vote.value())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("upserting vote of {:?} on {:?}", voter, comment))?;
    Ok(Ok(()))
}

/// Remove `voter`'s vote on `comment`, returning whether there was one
pub async fn retract_comment_vote(
    conn: &mut SqliteConnection,
    comment: CommentId,
    voter: UserId,
) -> anyhow::Result<Result<bool, ApiError>> {
    if get_comment(&mut *conn, comment).await?.is_none() {
        return Ok(Err(ApiError::CommentNotFound(comment)));
    }
    let res = sqlx::query("DELETE FROM comment_votes WHERE comment_id = ? AND user_id = ?")
        .bind(comment.0)
        .bind(voter.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("deleting vote of {:?} on {:?}", voter, comment))?;
    Ok(Ok(res.rows_affected() > 0))
}

pub async fn score_of(conn: &mut SqliteConnection, comment: CommentId) -> anyhow::Result<i64> {
    sqlx::query(
        "SELECT COALESCE(SUM(vote_type), 0) AS score FROM comment_votes WHERE comment_id = ?",
    )
    .bind(comment.0)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("summing votes on {:?}", comment))?
    .try_get("score")
    .context("retrieving the score field")
}

pub async fn comment_score(
    conn: &mut SqliteConnection,
    comment: CommentId,
    viewer: UserId,
) -> anyhow::Result<CommentScore> {
    let user_vote =
        sqlx::query("SELECT vote_type FROM comment_votes WHERE comment_id = ? AND user_id = ?")
            .bind(comment.0)
            .bind(viewer.0)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("fetching vote of {:?} on {:?}", viewer, comment))?
            .map(|r| vote_from_row(&r))
            .transpose()?;
    Ok(CommentScore {
        comment_id: comment,
        vote_count: score_of(&mut *conn, comment).await?,
        user_vote,
    })
}

fn vote_from_row(row: &SqliteRow) -> anyhow::Result<VoteMagnitude> {
    let v: i64 = row
        .try_get("vote_type")
        .context("retrieving the vote_type field")?;
    VoteMagnitude::try_from(v).map_err(|_| anyhow::anyhow!("comment_votes has vote_type {v}"))
}

/// Sum of the vote ledger of every voted-on comment of `bill`
pub async fn scores_for_bill(
    conn: &mut SqliteConnection,
    bill: BillId,
) -> anyhow::Result<HashMap<CommentId, i64>> {
    let mut res = HashMap::new();
    let mut rows = sqlx::query(
        "
            SELECT v.comment_id, SUM(v.vote_type) AS score
                FROM comment_votes v
            INNER JOIN comments c
                ON c.id = v.comment_id
            WHERE c.bill_id = ?
            GROUP BY v.comment_id
        ",
    )
    .bind(bill.0)
    .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying comment_votes table")? {
        res.insert(
            CommentId(
                row.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            ),
            row.try_get("score").context("retrieving the score field")?,
        );
    }
    Ok(res)
}

pub async fn viewer_votes_for_bill(
    conn: &mut SqliteConnection,
    bill: BillId,
    viewer: UserId,
) -> anyhow::Result<HashMap<CommentId, VoteMagnitude>> {
    let mut res = HashMap::new();
    let mut rows = sqlx::query(
        "
            SELECT v.comment_id, v.vote_type
                FROM comment_votes v
            INNER JOIN comments c
                ON c.id = v.comment_id
            WHERE c.bill_id = ?
            AND v.user_id = ?
        ",
    )
    .bind(bill.0)
    .bind(viewer.0)
    .fetch(&mut *conn);
    while let Some(row) = rows.try_next().await.context("querying comment_votes table")? {
        res.insert(
            CommentId(
                row.try_get("comment_id")
                    .context("retrieving the comment_id field")?,
            ),
            vote_from_row(&row)?,
        );
    }
    Ok(res)
}

// Tree assembler

/// Threaded comments of `bill` with their scores, built from three queries
/// whatever the number of comments.
pub async fn assemble_forest(
    conn: &mut SqliteConnection,
    bill: BillId,
    sort: SortOrder,
    viewer: Option<UserId>,
) -> anyhow::Result<Vec<CommentView>> {
    let records = fetch_comments_for_bill(&mut *conn, bill)
        .await
        .with_context(|| format!("fetching comments of {:?}", bill))?;
    let scores = scores_for_bill(&mut *conn, bill)
        .await
        .with_context(|| format!("fetching comment scores of {:?}", bill))?;
    let viewer_votes = match viewer {
        Some(user) => viewer_votes_for_bill(&mut *conn, bill, user)
            .await
            .with_context(|| format!("fetching votes of {:?} on {:?}", user, bill))?,
        None => HashMap::new(),
    };
    tracing::debug!(
        ?bill,
        num_comments = records.len(),
        num_scored = scores.len(),
        "assembling comment forest"
    );
    Ok(docket_api::assemble_forest(
        records,
        &scores,
        &viewer_votes,
        sort,
    ))
}
