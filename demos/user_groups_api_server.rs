use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use subseq_user_groups::api::{HasPool, UserGroupApp};
use subseq_user_groups::prelude::{ActorContext, UserId};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct DevAuthConfig {
    default_user_id: UserId,
    default_is_admin: bool,
    require_dev_header: bool,
}

#[derive(Clone)]
struct DemoApp {
    pool: Arc<PgPool>,
    auth: DevAuthConfig,
}

impl HasPool for DemoApp {
    fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

impl UserGroupApp for DemoApp {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .context("DATABASE_URL is required to run demos/user_groups_api_server.rs")?;
    let bind = env::var("USER_GROUPS_DEMO_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid USER_GROUPS_DEMO_BIND '{}'", bind))?;

    let default_user_id = env::var("USER_GROUPS_DEMO_DEFAULT_USER_ID")
        .unwrap_or_else(|_| "1".to_string());
    let default_user_id: UserId = default_user_id.parse().with_context(|| {
        format!(
            "invalid USER_GROUPS_DEMO_DEFAULT_USER_ID '{}'",
            default_user_id
        )
    })?;
    let auth = DevAuthConfig {
        default_user_id,
        default_is_admin: env_flag("USER_GROUPS_DEMO_DEFAULT_ADMIN"),
        require_dev_header: env_flag("USER_GROUPS_DEMO_REQUIRE_DEV_HEADER"),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    subseq_user_groups::db::create_user_group_tables(&pool)
        .await
        .context("failed to run user group migrations")?;

    let app_state = DemoApp {
        pool: Arc::new(pool),
        auth,
    };

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .route("/demo/whoami", get(whoami_handler))
        .merge(subseq_user_groups::api::routes::<DemoApp>());

    let app = Router::new()
        .nest("/api/v1", api_v1)
        .layer(from_fn_with_state(
            app_state.clone(),
            dev_identity_middleware,
        ))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!(%bind_addr, "user groups demo server listening");
    tracing::info!("auth shim headers: x-dev-user-id, x-dev-admin");

    axum::serve(listener, app)
        .await
        .context("demo server failed")
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => parse_flag(&value),
        Err(_) => false,
    }
}

fn parse_flag(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes"
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

async fn whoami_handler(Extension(actor): Extension<ActorContext>) -> Json<ActorContext> {
    Json(actor)
}

async fn dev_identity_middleware(
    State(app): State<DemoApp>,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers();
    let user_id = match parse_user_id(headers, &app.auth) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let is_admin = header_value(headers, "x-dev-admin")
        .map(parse_flag)
        .unwrap_or(app.auth.default_is_admin);

    req.extensions_mut()
        .insert(ActorContext::new(user_id, is_admin));
    next.run(req).await
}

fn parse_user_id(headers: &HeaderMap, auth: &DevAuthConfig) -> Result<UserId, Response> {
    let Some(raw_user_id) = header_value(headers, "x-dev-user-id") else {
        if auth.require_dev_header {
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "missing_dev_user_id",
                "x-dev-user-id header is required",
            ));
        }
        return Ok(auth.default_user_id);
    };

    raw_user_id.trim().parse::<UserId>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_dev_user_id",
            "x-dev-user-id must be a numeric user id",
        )
    })
}

fn header_value<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a str> {
    headers.get(key).and_then(|value| value.to_str().ok())
}

fn json_error(status: StatusCode, code: &'static str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        })),
    )
        .into_response()
}
