use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use crate::db;
use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateUserGroupPayload, ListUserGroupsForAdminQuery, ListUserGroupsForOperationQuery,
    ListUserGroupsQuery, ModifyUserGroupPayload,
};
use crate::permissions::ActorContext;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);

        tracing::error!(kind = ?self.0.kind, error = %self.0.source, "user group api request failed");
        let body = Json(json!({
            "error": {
                "code": self.0.code,
                "message": self.0.public,
            }
        }));
        (status, body).into_response()
    }
}

pub trait HasPool {
    fn pool(&self) -> Arc<sqlx::PgPool>;
}

/// Application state able to serve the user group routes. The caller's
/// [`ActorContext`] is expected as a request extension, inserted by the
/// host's authentication middleware.
pub trait UserGroupApp: HasPool {}

async fn list_admin_user_groups_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Query(query): Query<ListUserGroupsForAdminQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    let page = db::list_user_groups_for_admin(&app.pool(), &actor, query).await?;
    Ok(Json(page))
}

async fn create_user_group_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Json(payload): Json<CreateUserGroupPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    let user_group = db::create_user_group(&app.pool(), &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(user_group)))
}

async fn get_user_group_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    let user_group = db::get_user_group(&app.pool(), &actor, &slug).await?;
    Ok(Json(user_group))
}

async fn modify_user_group_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Path(slug): Path<String>,
    Json(mut payload): Json<ModifyUserGroupPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    payload.slug = slug;
    let user_group = db::modify_user_group(&app.pool(), &actor, payload).await?;
    Ok(Json(user_group))
}

async fn delete_user_group_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    db::delete_user_group(&app.pool(), &actor, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_user_groups_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Query(query): Query<ListUserGroupsQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    let user_groups = db::list_user_groups(&app.pool(), &actor, query).await?;
    Ok(Json(user_groups))
}

async fn list_operation_user_groups_handler<S>(
    State(app): State<S>,
    Extension(actor): Extension<ActorContext>,
    Path(operation_slug): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    let roles = db::list_user_groups_for_operation(
        &app.pool(),
        &actor,
        ListUserGroupsForOperationQuery { operation_slug },
    )
    .await?;
    Ok(Json(roles))
}

pub fn routes<S>() -> Router<S>
where
    S: UserGroupApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /admin/usergroups [GET,POST]");
    tracing::info!("Registering route /admin/usergroups/{{slug}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /usergroups [GET]");
    tracing::info!("Registering route /operations/{{operation_slug}}/usergroups [GET]");

    Router::new()
        .route(
            "/admin/usergroups",
            get(list_admin_user_groups_handler::<S>).post(create_user_group_handler::<S>),
        )
        .route(
            "/admin/usergroups/{slug}",
            get(get_user_group_handler::<S>)
                .put(modify_user_group_handler::<S>)
                .delete(delete_user_group_handler::<S>),
        )
        .route("/usergroups", get(search_user_groups_handler::<S>))
        .route(
            "/operations/{operation_slug}/usergroups",
            get(list_operation_user_groups_handler::<S>),
        )
}
