use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use docket_api::{AuthToken, Uuid};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod extractors;
mod handlers;

use error::Error;
use extractors::{AppState, DbPool, Limits};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(
    name = "docket-server",
    about = "REST backend for bills, threaded comments and votes"
)]
struct Opt {
    /// sqlx SQLite url, eg. `sqlite://docket.db`
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5001")]
    listen: SocketAddr,

    /// Bearer token granting access to the /api/admin routes, which are
    /// disabled when unset
    #[structopt(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<Uuid>,

    #[structopt(long, env = "MAX_CONNECTIONS", default_value = "5")]
    max_connections: u32,

    /// Upper bound on building one bill's comment forest
    #[structopt(long, env = "ASSEMBLY_TIMEOUT_MS", default_value = "5000")]
    assembly_timeout_ms: u64,

    /// Accept comments from callers without a bearer token
    #[structopt(
        long,
        env = "ALLOW_ANONYMOUS_COMMENTS",
        parse(try_from_str),
        default_value = "false"
    )]
    allow_anonymous_comments: bool,
}

pub async fn create_sqlx_pool(
    url: &str,
    max_connections: u32,
) -> anyhow::Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parsing database url {:?}", url))?
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("opening database {:?}", url))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/api/bills", get(handlers::list_bills))
        .route("/api/bills/:bill_id", get(handlers::get_bill))
        .route("/api/comments", post(handlers::submit_comment))
        .route("/api/comments/:bill_id", get(handlers::fetch_comments))
        .route(
            "/api/comments/:bill_id/children",
            get(handlers::fetch_children),
        )
        .route(
            "/api/users/:user_id/comments",
            get(handlers::fetch_user_comments),
        )
        .route("/api/comment-votes", post(handlers::submit_comment_vote))
        .route(
            "/api/comment-votes/:comment_id",
            delete(handlers::retract_comment_vote),
        )
        .route("/api/votes", post(handlers::submit_bill_vote))
        .route("/api/votes/:bill_id", get(handlers::fetch_bill_votes))
        .route("/api/admin/users", post(handlers::admin_create_user))
        .route("/api/admin/sessions", post(handlers::admin_create_session))
        .route("/api/admin/bills", post(handlers::admin_create_bill))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::from_args();
    let pool = create_sqlx_pool(&opt.database_url, opt.max_connections).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("applying database migrations")?;
    if opt.admin_token.is_none() {
        tracing::warn!("no admin token configured, admin routes will reject every request");
    }

    let state = AppState {
        db: DbPool::new(pool),
        admin_token: opt.admin_token.map(AuthToken),
        limits: Limits {
            assembly_timeout: Duration::from_millis(opt.assembly_timeout_ms),
            allow_anonymous_comments: opt.allow_anonymous_comments,
        },
    };

    tracing::info!(addr = %opt.listen, "listening");
    axum::Server::bind(&opt.listen)
        .serve(app(state).into_make_service())
        .await
        .context("serving axum webserver")
}
