pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
#[cfg(feature = "sqlx")]
pub mod operations;
pub mod permissions;

pub mod prelude {
    pub use crate::algorithms::{MembershipPlan, plan_membership_change, sort_users_into_groups};
    #[cfg(feature = "api")]
    pub use crate::api::{HasPool, UserGroupApp};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        add_users_to_group, create_user_group, create_user_group_tables, delete_user_group,
        get_slug_map, get_user_group, list_user_groups, list_user_groups_for_admin,
        list_user_groups_for_operation, modify_user_group,
    };
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::models::{
        CreateUserGroupPayload, ListUserGroupsForAdminQuery, ListUserGroupsForOperationQuery,
        ListUserGroupsQuery, ModifyUserGroupPayload, OperationId, OperationRole, Paged,
        Pagination, SlugMapRow, UserGroup, UserGroupAdminView, UserGroupId,
        UserGroupOperationRole, UserId,
    };
    #[cfg(feature = "sqlx")]
    pub use crate::operations::{UserGroupOperation, UserGroupOperationResult, UserGroupOperations};
    pub use crate::permissions::ActorContext;
}
