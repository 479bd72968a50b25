use std::collections::HashMap;

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use crate::algorithms::{plan_membership_change, sort_users_into_groups};
use crate::error::{LibError, Result};
use crate::models::{
    CreateUserGroupPayload, ListUserGroupsForAdminQuery, ListUserGroupsForOperationQuery,
    ListUserGroupsQuery, ModifyUserGroupPayload, OperationId, OperationRole, Paged, Pagination,
    SlugMapRow, UserGroup, UserGroupAdminView, UserGroupId, UserGroupOperationRole, UserId,
    like_contains_pattern,
};
use crate::permissions::{ActorContext, OPERATION_GROUPS_LIST_ROLE, require_admin};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_user_group_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct UserGroupRow {
    id: i64,
    slug: String,
    deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, FromRow)]
struct UserSlugRow {
    id: i64,
    slug: String,
}

#[derive(Debug, Clone, FromRow)]
struct UserGroupSummaryRow {
    slug: String,
    name: String,
}

#[derive(Debug, Clone, FromRow)]
struct GroupOperationRoleRow {
    slug: String,
    name: String,
    role: String,
}

impl From<UserGroupSummaryRow> for UserGroup {
    fn from(value: UserGroupSummaryRow) -> Self {
        Self {
            slug: value.slug,
            name: value.name,
        }
    }
}

impl TryFrom<GroupOperationRoleRow> for UserGroupOperationRole {
    type Error = LibError;

    fn try_from(value: GroupOperationRoleRow) -> Result<Self> {
        let role = OperationRole::from_db_value(&value.role).ok_or_else(|| {
            LibError::database(
                "Stored operation role is not recognized",
                anyhow!("group {} has unknown role {:?}", value.slug, value.role),
            )
        })?;
        Ok(Self {
            user_group: UserGroup {
                slug: value.slug,
                name: value.name,
            },
            role,
        })
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

async fn resolve_user_ids(
    conn: &mut PgConnection,
    user_slugs: &[String],
) -> Result<HashMap<String, UserId>> {
    if user_slugs.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, UserSlugRow>(
        r#"
        SELECT id, slug
        FROM usergroups.users
        WHERE slug = ANY($1)
          AND deleted_at IS NULL
        "#,
    )
    .bind(user_slugs)
    .fetch_all(&mut *conn)
    .await
    .map_err(|err| db_err("Failed to look up users", err))?;

    let resolved: HashMap<String, UserId> = rows
        .into_iter()
        .map(|row| (row.slug, UserId(row.id)))
        .collect();

    let missing: Vec<&str> = user_slugs
        .iter()
        .filter(|slug| !resolved.contains_key(slug.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(LibError::not_found(
            "One or more users could not be found",
            anyhow!("unknown user slugs: {}", missing.join(", ")),
        ));
    }

    Ok(resolved)
}

fn ids_for(slugs: &[String], resolved: &HashMap<String, UserId>) -> Vec<i64> {
    slugs
        .iter()
        .filter_map(|slug| resolved.get(slug))
        .map(|id| id.0)
        .collect()
}

async fn insert_memberships(
    conn: &mut PgConnection,
    group_id: UserGroupId,
    user_ids: Vec<i64>,
) -> Result<u64> {
    if user_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO usergroups.group_user_map (group_id, user_id)
        SELECT $1, member_id
        FROM UNNEST($2::bigint[]) AS member_id
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(group_id.0)
    .bind(user_ids)
    .execute(&mut *conn)
    .await
    .context("inserting group memberships")
    .map_err(|err| LibError::database("Failed to add users to group", err))?;

    Ok(result.rows_affected())
}

async fn delete_memberships(
    conn: &mut PgConnection,
    group_id: UserGroupId,
    user_ids: Vec<i64>,
) -> Result<u64> {
    if user_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        DELETE FROM usergroups.group_user_map
        WHERE group_id = $1
          AND user_id = ANY($2)
        "#,
    )
    .bind(group_id.0)
    .bind(user_ids)
    .execute(&mut *conn)
    .await
    .context("deleting group memberships")
    .map_err(|err| LibError::database("Failed to remove users from group", err))?;

    Ok(result.rows_affected())
}

async fn group_member_slugs(conn: &mut PgConnection, group_id: UserGroupId) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT u.slug
        FROM usergroups.group_user_map m
        JOIN usergroups.users u
          ON u.id = m.user_id
        WHERE m.group_id = $1
        ORDER BY u.slug ASC
        "#,
    )
    .bind(group_id.0)
    .fetch_all(&mut *conn)
    .await
    .map_err(|err| db_err("Failed to query group members", err))?;

    Ok(rows.into_iter().map(|(slug,)| slug).collect())
}

async fn lock_group_by_slug(conn: &mut PgConnection, slug: &str) -> Result<UserGroupRow> {
    let row = sqlx::query_as::<_, UserGroupRow>(
        r#"
        SELECT id, slug, deleted_at
        FROM usergroups.user_groups
        WHERE slug = $1
        FOR UPDATE
        "#,
    )
    .bind(slug)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| db_err("Failed to query user group", err))?;

    row.ok_or_else(|| {
        LibError::not_found(
            "User group not found",
            anyhow!("user group {} not found", slug),
        )
    })
}

async fn group_slug_exists(pool: &PgPool, slug: &str) -> Result<bool> {
    let exists: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM usergroups.user_groups
            WHERE slug = $1
        )
        "#,
    )
    .bind(slug)
    .fetch_one(pool)
    .await
    .map_err(|err| db_err("Failed to query user group", err))?;

    Ok(exists.0)
}

/// Adds the users named by `user_slugs` to a group inside the caller's
/// transaction. Users already in the group are left alone; any unknown slug
/// fails the call before anything is written.
pub async fn add_users_to_group(
    tx: &mut Transaction<'_, Postgres>,
    user_slugs: &[String],
    group_id: UserGroupId,
) -> Result<u64> {
    let resolved = resolve_user_ids(&mut **tx, user_slugs).await?;
    insert_memberships(&mut **tx, group_id, ids_for(user_slugs, &resolved)).await
}

pub async fn create_user_group(
    pool: &PgPool,
    actor: &ActorContext,
    payload: CreateUserGroupPayload,
) -> Result<UserGroupAdminView> {
    require_admin(actor, "You do not have permission to create user groups")?;
    let definition = payload.normalize()?;

    if group_slug_exists(pool, &definition.slug).await? {
        return Err(LibError::conflict(
            "A user group with this slug already exists",
            anyhow!("user group slug {} is taken", definition.slug),
        ));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    let (group_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO usergroups.user_groups (slug, name)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(&definition.slug)
    .bind(&definition.name)
    .fetch_one(&mut *tx)
    .await?;

    let added = add_users_to_group(&mut tx, &definition.user_slugs, UserGroupId(group_id)).await?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    tracing::info!(
        actor = %actor.user_id,
        group = %definition.slug,
        members = added,
        "created user group"
    );

    load_user_group_view(pool, &definition.slug).await
}

pub async fn modify_user_group(
    pool: &PgPool,
    actor: &ActorContext,
    payload: ModifyUserGroupPayload,
) -> Result<UserGroupAdminView> {
    require_admin(actor, "You do not have permission to modify user groups")?;
    let changes = payload.normalize()?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    let group = lock_group_by_slug(&mut tx, &changes.slug).await?;
    let group_id = UserGroupId(group.id);

    sqlx::query(
        r#"
        UPDATE usergroups.user_groups
        SET name = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        "#,
    )
    .bind(&changes.name)
    .bind(group_id.0)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to update user group", err))?;

    let mut referenced = changes.users_to_add.clone();
    referenced.extend(changes.users_to_remove.iter().cloned());
    let resolved = resolve_user_ids(&mut tx, &referenced).await?;

    let current = group_member_slugs(&mut tx, group_id).await?;
    let plan = plan_membership_change(&current, &changes.users_to_add, &changes.users_to_remove);

    let added = insert_memberships(&mut tx, group_id, ids_for(&plan.to_insert, &resolved)).await?;
    let removed =
        delete_memberships(&mut tx, group_id, ids_for(&plan.to_delete, &resolved)).await?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    tracing::info!(
        actor = %actor.user_id,
        group = %group.slug,
        added,
        removed,
        members = plan.final_members.len(),
        "modified user group"
    );

    load_user_group_view(pool, &group.slug).await
}

/// Soft-deletes a group. Memberships are kept so the group's history stays
/// queryable.
pub async fn delete_user_group(pool: &PgPool, actor: &ActorContext, slug: &str) -> Result<()> {
    require_admin(actor, "You do not have permission to delete user groups")?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    let group = lock_group_by_slug(&mut tx, slug.trim()).await?;
    if group.deleted_at.is_some() {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE usergroups.user_groups
        SET deleted_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(group.id)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to delete user group", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    tracing::info!(actor = %actor.user_id, group = %group.slug, "deleted user group");
    Ok(())
}

pub async fn get_user_group(
    pool: &PgPool,
    actor: &ActorContext,
    slug: &str,
) -> Result<UserGroupAdminView> {
    require_admin(actor, "You do not have permission to view user groups")?;
    load_user_group_view(pool, slug.trim()).await
}

async fn load_user_group_view(pool: &PgPool, slug: &str) -> Result<UserGroupAdminView> {
    let rows = sqlx::query_as::<_, SlugMapRow>(
        r#"
        SELECT
            u.slug AS user_slug,
            g.slug AS group_slug,
            g.name AS group_name,
            g.deleted_at
        FROM usergroups.user_groups g
        LEFT JOIN usergroups.group_user_map m
          ON m.group_id = g.id
        LEFT JOIN usergroups.users u
          ON u.id = m.user_id
        WHERE g.slug = $1
        ORDER BY u.slug ASC NULLS FIRST
        "#,
    )
    .bind(slug)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to query user group", err))?;

    sort_users_into_groups(rows, Pagination::new(1, 1))
        .content
        .into_iter()
        .next()
        .ok_or_else(|| {
            LibError::not_found(
                "User group not found",
                anyhow!("user group {} not found", slug),
            )
        })
}

/// Flat group/member join driving the admin listing: one row per member,
/// one `NULL` member row per empty group, ordered by group name.
pub async fn get_slug_map(pool: &PgPool, include_deleted: bool) -> Result<Vec<SlugMapRow>> {
    sqlx::query_as::<_, SlugMapRow>(
        r#"
        SELECT
            u.slug AS user_slug,
            g.slug AS group_slug,
            g.name AS group_name,
            g.deleted_at
        FROM usergroups.user_groups g
        LEFT JOIN usergroups.group_user_map m
          ON m.group_id = g.id
        LEFT JOIN usergroups.users u
          ON u.id = m.user_id
        WHERE ($1 OR g.deleted_at IS NULL)
        ORDER BY g.name ASC, g.slug ASC, u.slug ASC NULLS FIRST
        "#,
    )
    .bind(include_deleted)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list user groups", err))
}

pub async fn list_user_groups_for_admin(
    pool: &PgPool,
    actor: &ActorContext,
    query: ListUserGroupsForAdminQuery,
) -> Result<Paged<UserGroupAdminView>> {
    require_admin(actor, "You do not have permission to list user groups")?;
    let rows = get_slug_map(pool, query.include_deleted()).await?;
    Ok(sort_users_into_groups(rows, query.pagination()))
}

/// Case-insensitive substring search over group names. Pattern
/// metacharacters in the query only match themselves.
pub async fn list_user_groups(
    pool: &PgPool,
    actor: &ActorContext,
    query: ListUserGroupsQuery,
) -> Result<Vec<UserGroup>> {
    require_admin(actor, "You do not have permission to search user groups")?;
    let Some(text) = query.search_text() else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query_as::<_, UserGroupSummaryRow>(
        r#"
        SELECT slug, name
        FROM usergroups.user_groups
        WHERE name ILIKE $1 ESCAPE '\'
          AND ($2 OR deleted_at IS NULL)
        ORDER BY name ASC, slug ASC
        "#,
    )
    .bind(like_contains_pattern(text))
    .bind(query.include_deleted)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to search user groups", err))?;

    Ok(rows.into_iter().map(UserGroup::from).collect())
}

/// Resolves `operation_slug` and checks that the actor holds `role` on it,
/// either directly or through a live group they belong to. An unknown
/// operation is reported as `Forbidden`, same as a missing grant. Global
/// admin status is not consulted.
pub async fn ensure_operation_role(
    pool: &PgPool,
    actor: &ActorContext,
    operation_slug: &str,
    role: OperationRole,
    public: &'static str,
) -> Result<OperationId> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT o.id
        FROM usergroups.operations o
        WHERE o.slug = $2
          AND EXISTS(
            SELECT 1
            FROM usergroups.user_operation_permissions p
            WHERE p.user_id = $1
              AND p.operation_id = o.id
              AND p.role = $3
            UNION ALL
            SELECT 1
            FROM usergroups.user_group_operation_permissions gp
            JOIN usergroups.group_user_map m
              ON m.group_id = gp.group_id
            JOIN usergroups.user_groups g
              ON g.id = gp.group_id
            WHERE m.user_id = $1
              AND gp.operation_id = o.id
              AND gp.role = $3
              AND g.deleted_at IS NULL
          )
        "#,
    )
    .bind(actor.user_id.0)
    .bind(operation_slug)
    .bind(role.as_db_value())
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query operation permissions", err))?;

    match row {
        Some((id,)) => Ok(OperationId(id)),
        None => {
            tracing::warn!(
                user_id = %actor.user_id,
                operation = %operation_slug,
                role = %role,
                "operation role check failed"
            );
            Err(LibError::forbidden(
                public,
                anyhow!(
                    "user {} lacks {} role on operation {}",
                    actor.user_id,
                    role,
                    operation_slug
                ),
            ))
        }
    }
}

/// Groups attached to an operation with their role on it, one entry per
/// grant, ordered by group name then slug. Deleted groups are left out.
pub async fn list_user_groups_for_operation(
    pool: &PgPool,
    actor: &ActorContext,
    query: ListUserGroupsForOperationQuery,
) -> Result<Vec<UserGroupOperationRole>> {
    let operation_slug = query.operation_slug.trim();
    let operation_id = ensure_operation_role(
        pool,
        actor,
        operation_slug,
        OPERATION_GROUPS_LIST_ROLE,
        "You do not have permission to list user groups for this operation",
    )
    .await?;

    let rows = sqlx::query_as::<_, GroupOperationRoleRow>(
        r#"
        SELECT g.slug, g.name, gp.role
        FROM usergroups.user_group_operation_permissions gp
        JOIN usergroups.user_groups g
          ON g.id = gp.group_id
        WHERE gp.operation_id = $1
          AND g.deleted_at IS NULL
        ORDER BY g.name ASC, g.slug ASC
        "#,
    )
    .bind(operation_id.0)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list operation user groups", err))?;

    rows.into_iter()
        .map(UserGroupOperationRole::try_from)
        .collect()
}
