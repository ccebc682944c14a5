use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use anyhow::Context;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{self, request, Request},
};
use docket_api::{AuthToken, UserId, Uuid};

use crate::{db, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: DbPool,
    pub admin_token: Option<AuthToken>,
    pub limits: Limits,
}

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub assembly_timeout: Duration,
    pub allow_anonymous_comments: bool,
}

#[derive(Clone)]
pub struct DbPool(sqlx::SqlitePool);

impl DbPool {
    pub fn new(pool: sqlx::SqlitePool) -> DbPool {
        DbPool(pool)
    }

    pub async fn acquire(&self) -> Result<DbConn, Error> {
        Ok(DbConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

/// One pooled connection, held for the whole request so that a request
/// always reads its own writes
pub struct DbConn(sqlx::pool::PoolConnection<sqlx::Sqlite>);

#[async_trait]
impl FromRequestParts<AppState> for DbConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<DbConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for DbConn {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DbConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::unauthorized()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::permission_denied())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::permission_denied())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::permission_denied());
                }
                let token = auth.next().ok_or(Error::permission_denied())?;
                if auth.next().is_some() {
                    return Err(Error::permission_denied());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::permission_denied())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

/// Identity of the caller, required
pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = DbConn::from_request_parts(req, state).await?;
        Ok(Auth(db::recover_session(&mut *conn, token).await?))
    }
}

/// Identity of the caller if they sent one. A token that was sent but is
/// invalid is still rejected.
pub struct MaybeAuth(pub Option<UserId>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<MaybeAuth, Error> {
        if !req.headers.contains_key(http::header::AUTHORIZATION) {
            return Ok(MaybeAuth(None));
        }
        let Auth(user) = Auth::from_request_parts(req, state).await?;
        Ok(MaybeAuth(Some(user)))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}

/// `axum::Json`, but answering malformed bodies with a validation error
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for ValidJson<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<ValidJson<T>, Error> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(v)) => Ok(ValidJson(v)),
            Err(rejection) => Err(Error::validation(rejection.body_text())),
        }
    }
}

/// `axum::extract::Query`, but answering malformed query strings with a
/// validation error
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    axum::extract::Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &S,
    ) -> Result<ValidQuery<T>, Error> {
        match axum::extract::Query::<T>::from_request_parts(req, state).await {
            Ok(axum::extract::Query(v)) => Ok(ValidQuery(v)),
            Err(rejection) => Err(Error::validation(rejection.body_text())),
        }
    }
}

/// `axum::extract::Path`, but answering malformed segments with a validation
/// error
pub struct ValidPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidPath<T>
where
    axum::extract::Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &S,
    ) -> Result<ValidPath<T>, Error> {
        match axum::extract::Path::<T>::from_request_parts(req, state).await {
            Ok(axum::extract::Path(v)) => Ok(ValidPath(v)),
            Err(rejection) => Err(Error::validation(rejection.body_text())),
        }
    }
}
