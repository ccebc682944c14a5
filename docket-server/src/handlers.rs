use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use docket_api::{
    AuthToken, Bill, BillId, BillVote, BillVoteTally, Comment, CommentId, CommentScore,
    CommentView, NewBill, NewBillVote, NewComment, NewCommentVote, NewSession, NewUser,
    Pagination, SortOrder, User, UserId,
};

use crate::{db, extractors::*, Error};

fn sort_order(param: Option<&str>, default: SortOrder) -> Result<SortOrder, Error> {
    Ok(match param {
        None => default,
        Some(s) => s.parse()?,
    })
}

pub async fn health() -> &'static str {
    "docket API is running."
}

pub async fn list_bills(mut conn: DbConn) -> Result<Json<Vec<Bill>>, Error> {
    Ok(Json(
        db::list_bills(&mut *conn)
            .await
            .context("fetching bill list")?,
    ))
}

pub async fn get_bill(
    mut conn: DbConn,
    ValidPath(bill): ValidPath<i64>,
) -> Result<Json<Bill>, Error> {
    let bill = BillId(bill);
    Ok(Json(
        db::get_bill(&mut *conn, bill)
            .await
            .with_context(|| format!("fetching {:?}", bill))?
            .ok_or(docket_api::Error::BillNotFound(bill))?,
    ))
}

pub async fn submit_comment(
    MaybeAuth(author): MaybeAuth,
    State(limits): State<Limits>,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewComment>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    if author.is_none() && !limits.allow_anonymous_comments {
        return Err(Error::unauthorized());
    }
    let comment = db::create_comment(&mut *conn, author, &data, Utc::now())
        .await
        .with_context(|| format!("submitting comment of {:?} on {:?}", author, data.bill_id))??;
    tracing::debug!(id = ?comment.id, bill = ?comment.bill_id, "new comment");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, serde::Deserialize)]
pub struct ForestParams {
    sort: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// The time limit covers waiting for a connection as well as the queries
pub async fn fetch_comments(
    MaybeAuth(viewer): MaybeAuth,
    State(limits): State<Limits>,
    State(pool): State<DbPool>,
    ValidPath(bill): ValidPath<i64>,
    ValidQuery(params): ValidQuery<ForestParams>,
) -> Result<Json<Vec<CommentView>>, Error> {
    let bill = BillId(bill);
    let sort = sort_order(params.sort.as_deref(), SortOrder::DateDescending)?;
    let page = Pagination {
        page: params.page,
        limit: params.limit,
    };
    page.validate()?;
    let assembly = async {
        let mut conn = pool.acquire().await?;
        db::assemble_forest(&mut *conn, bill, sort, viewer)
            .await
            .with_context(|| format!("assembling comment forest of {:?}", bill))
            .map_err(Error::from)
    };
    let forest = tokio::time::timeout(limits.assembly_timeout, assembly)
        .await
        .map_err(|_| {
            tracing::warn!(
                ?bill,
                timeout = ?limits.assembly_timeout,
                "comment forest assembly timed out"
            );
            Error::timeout()
        })??;
    Ok(Json(page.apply(forest)))
}

#[derive(Debug, serde::Deserialize)]
pub struct ChildrenParams {
    parent: Option<i64>,
    sort: Option<String>,
}

pub async fn fetch_children(
    mut conn: DbConn,
    ValidPath(bill): ValidPath<i64>,
    ValidQuery(params): ValidQuery<ChildrenParams>,
) -> Result<Json<Vec<Comment>>, Error> {
    let bill = BillId(bill);
    let parent = params.parent.map(CommentId);
    let sort = sort_order(params.sort.as_deref(), SortOrder::DateDescending)?;
    Ok(Json(
        db::list_direct_children(&mut *conn, bill, parent, sort)
            .await
            .with_context(|| format!("listing replies to {:?} on {:?}", parent, bill))?,
    ))
}

pub async fn fetch_user_comments(
    mut conn: DbConn,
    ValidPath(user): ValidPath<i64>,
    ValidQuery(page): ValidQuery<Pagination>,
) -> Result<Json<Vec<Comment>>, Error> {
    let user = UserId(user);
    Ok(Json(
        db::comments_by_user(&mut *conn, user, &page)
            .await
            .with_context(|| format!("listing comments of {:?}", user))??,
    ))
}

pub async fn submit_comment_vote(
    Auth(user): Auth,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewCommentVote>,
) -> Result<Json<CommentScore>, Error> {
    db::cast_comment_vote(&mut *conn, data.comment_id, user, data.vote_type)
        .await
        .with_context(|| format!("recording vote of {:?} on {:?}", user, data.comment_id))??;
    Ok(Json(
        db::comment_score(&mut *conn, data.comment_id, user)
            .await
            .with_context(|| format!("reading score of {:?}", data.comment_id))?,
    ))
}

pub async fn retract_comment_vote(
    Auth(user): Auth,
    mut conn: DbConn,
    ValidPath(comment): ValidPath<i64>,
) -> Result<Json<CommentScore>, Error> {
    let comment = CommentId(comment);
    let removed = db::retract_comment_vote(&mut *conn, comment, user)
        .await
        .with_context(|| format!("retracting vote of {:?} on {:?}", user, comment))??;
    if !removed {
        tracing::debug!(?user, ?comment, "retracted a vote that did not exist");
    }
    Ok(Json(
        db::comment_score(&mut *conn, comment, user)
            .await
            .with_context(|| format!("reading score of {:?}", comment))?,
    ))
}

pub async fn submit_bill_vote(
    MaybeAuth(voter): MaybeAuth,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewBillVote>,
) -> Result<(StatusCode, Json<BillVote>), Error> {
    let vote = db::cast_bill_vote(&mut *conn, voter, &data)
        .await
        .with_context(|| format!("recording vote of {:?} on {:?}", voter, data.bill_id))??;
    let status = match voter {
        Some(_) => StatusCode::OK,
        None => StatusCode::CREATED,
    };
    Ok((status, Json(vote)))
}

pub async fn fetch_bill_votes(
    mut conn: DbConn,
    ValidPath(bill): ValidPath<i64>,
) -> Result<Json<BillVoteTally>, Error> {
    let bill = BillId(bill);
    Ok(Json(
        db::bill_vote_tally(&mut *conn, bill)
            .await
            .with_context(|| format!("tallying votes on {:?}", bill))??,
    ))
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewUser>,
) -> Result<(StatusCode, Json<User>), Error> {
    let id = db::create_user(&mut *conn, &data)
        .await
        .context("creating user")??;
    tracing::info!(?id, "created user");
    Ok((
        StatusCode::CREATED,
        Json(User {
            id,
            username: data.username,
        }),
    ))
}

pub async fn admin_create_session(
    AdminAuth: AdminAuth,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    Ok(Json(
        db::create_session(&mut *conn, data.user_id)
            .await
            .with_context(|| format!("opening session for {:?}", data.user_id))??,
    ))
}

pub async fn admin_create_bill(
    AdminAuth: AdminAuth,
    mut conn: DbConn,
    ValidJson(data): ValidJson<NewBill>,
) -> Result<(StatusCode, Json<Bill>), Error> {
    data.validate()?;
    let bill = db::create_bill(&mut *conn, &data)
        .await
        .context("creating bill")?;
    tracing::info!(id = ?bill.id, number = %bill.bill_number, "created bill");
    Ok((StatusCode::CREATED, Json(bill)))
}
