use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db;
use crate::error::Result;
use crate::models::{
    CreateUserGroupPayload, ListUserGroupsForAdminQuery, ListUserGroupsForOperationQuery,
    ListUserGroupsQuery, ModifyUserGroupPayload, Paged, UserGroup, UserGroupAdminView,
    UserGroupOperationRole,
};
use crate::permissions::ActorContext;

/// High-level user group actions for tool and RPC callers.
///
/// The `actor` passed to [`UserGroupOperations::execute`] must come from
/// validated auth/session state, never from the operation arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum UserGroupOperation {
    Create {
        payload: CreateUserGroupPayload,
    },
    Modify {
        payload: ModifyUserGroupPayload,
    },
    Delete {
        slug: String,
    },
    Get {
        slug: String,
    },
    ListForAdmin {
        #[serde(default)]
        query: ListUserGroupsForAdminQuery,
    },
    Search {
        query: ListUserGroupsQuery,
    },
    ListForOperation {
        query: ListUserGroupsForOperationQuery,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UserGroupOperationResult {
    UserGroup {
        user_group: UserGroupAdminView,
    },
    UserGroupsPage {
        page: u32,
        page_size: u32,
        total_count: u64,
        content: Vec<UserGroupAdminView>,
    },
    UserGroups {
        user_groups: Vec<UserGroup>,
    },
    OperationRoles {
        roles: Vec<UserGroupOperationRole>,
    },
    Deleted,
}

impl From<Paged<UserGroupAdminView>> for UserGroupOperationResult {
    fn from(value: Paged<UserGroupAdminView>) -> Self {
        UserGroupOperationResult::UserGroupsPage {
            page: value.page,
            page_size: value.page_size,
            total_count: value.total_count,
            content: value.content,
        }
    }
}

#[derive(Clone)]
pub struct UserGroupOperations {
    pool: Arc<PgPool>,
}

impl UserGroupOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub async fn execute(
        &self,
        actor: &ActorContext,
        operation: UserGroupOperation,
    ) -> Result<UserGroupOperationResult> {
        match operation {
            UserGroupOperation::Create { payload } => {
                let user_group = self.create_user_group(actor, payload).await?;
                Ok(UserGroupOperationResult::UserGroup { user_group })
            }
            UserGroupOperation::Modify { payload } => {
                let user_group = self.modify_user_group(actor, payload).await?;
                Ok(UserGroupOperationResult::UserGroup { user_group })
            }
            UserGroupOperation::Delete { slug } => {
                self.delete_user_group(actor, &slug).await?;
                Ok(UserGroupOperationResult::Deleted)
            }
            UserGroupOperation::Get { slug } => {
                let user_group = self.get_user_group(actor, &slug).await?;
                Ok(UserGroupOperationResult::UserGroup { user_group })
            }
            UserGroupOperation::ListForAdmin { query } => {
                let page = self.list_user_groups_for_admin(actor, query).await?;
                Ok(page.into())
            }
            UserGroupOperation::Search { query } => {
                let user_groups = self.list_user_groups(actor, query).await?;
                Ok(UserGroupOperationResult::UserGroups { user_groups })
            }
            UserGroupOperation::ListForOperation { query } => {
                let roles = self.list_user_groups_for_operation(actor, query).await?;
                Ok(UserGroupOperationResult::OperationRoles { roles })
            }
        }
    }

    pub async fn create_user_group(
        &self,
        actor: &ActorContext,
        payload: CreateUserGroupPayload,
    ) -> Result<UserGroupAdminView> {
        db::create_user_group(&self.pool, actor, payload).await
    }

    pub async fn modify_user_group(
        &self,
        actor: &ActorContext,
        payload: ModifyUserGroupPayload,
    ) -> Result<UserGroupAdminView> {
        db::modify_user_group(&self.pool, actor, payload).await
    }

    pub async fn delete_user_group(&self, actor: &ActorContext, slug: &str) -> Result<()> {
        db::delete_user_group(&self.pool, actor, slug).await
    }

    pub async fn get_user_group(
        &self,
        actor: &ActorContext,
        slug: &str,
    ) -> Result<UserGroupAdminView> {
        db::get_user_group(&self.pool, actor, slug).await
    }

    pub async fn list_user_groups_for_admin(
        &self,
        actor: &ActorContext,
        query: ListUserGroupsForAdminQuery,
    ) -> Result<Paged<UserGroupAdminView>> {
        db::list_user_groups_for_admin(&self.pool, actor, query).await
    }

    pub async fn list_user_groups(
        &self,
        actor: &ActorContext,
        query: ListUserGroupsQuery,
    ) -> Result<Vec<UserGroup>> {
        db::list_user_groups(&self.pool, actor, query).await
    }

    pub async fn list_user_groups_for_operation(
        &self,
        actor: &ActorContext,
        query: ListUserGroupsForOperationQuery,
    ) -> Result<Vec<UserGroupOperationRole>> {
        db::list_user_groups_for_operation(&self.pool, actor, query).await
    }
}
