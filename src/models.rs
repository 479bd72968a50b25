use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 200;

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                i64::from_str(s).map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(UserId);
numeric_id!(UserGroupId);
numeric_id!(OperationId);

/// Role a user or user group holds on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationRole {
    Read,
    Write,
    Admin,
}

impl OperationRole {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            OperationRole::Read => "read",
            OperationRole::Write => "write",
            OperationRole::Admin => "admin",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "read" => Some(OperationRole::Read),
            "write" => Some(OperationRole::Write),
            "admin" => Some(OperationRole::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for OperationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub slug: String,
    pub name: String,
}

/// Group as shown on the admin screens, with its member slugs folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupAdminView {
    pub name: String,
    pub slug: String,
    pub deleted: bool,
    pub user_slugs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupOperationRole {
    pub user_group: UserGroup,
    pub role: OperationRole,
}

/// One row of the group/member join. Groups without members produce a
/// single row whose `user_slug` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SlugMapRow {
    pub user_slug: Option<String>,
    pub group_slug: String,
    pub group_name: String,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub content: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserGroupPayload {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub user_slugs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyUserGroupPayload {
    pub name: String,
    /// Slug of the group being modified. Filled from the route on the HTTP surface.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub users_to_add: Vec<String>,
    #[serde(default)]
    pub users_to_remove: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserGroupsForAdminQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserGroupsQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserGroupsForOperationQuery {
    pub operation_slug: String,
}

#[derive(Debug, Clone)]
pub struct UserGroupDefinition {
    pub name: String,
    pub slug: String,
    pub user_slugs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserGroupChanges {
    pub name: String,
    pub slug: String,
    pub users_to_add: Vec<String>,
    pub users_to_remove: Vec<String>,
}

impl ListUserGroupsForAdminQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }

    pub fn include_deleted(&self) -> bool {
        self.include_deleted.unwrap_or(false)
    }
}

impl ListUserGroupsQuery {
    /// Trimmed search text, or `None` when there is nothing to search for.
    pub fn search_text(&self) -> Option<&str> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

impl CreateUserGroupPayload {
    pub fn normalize(self) -> Result<UserGroupDefinition> {
        Ok(UserGroupDefinition {
            name: normalize_name(self.name)?,
            slug: normalize_slug(self.slug)?,
            user_slugs: normalize_user_slugs(self.user_slugs)?,
        })
    }
}

impl ModifyUserGroupPayload {
    pub fn normalize(self) -> Result<UserGroupChanges> {
        Ok(UserGroupChanges {
            name: normalize_name(self.name)?,
            slug: normalize_slug(self.slug)?,
            users_to_add: normalize_user_slugs(self.users_to_add)?,
            users_to_remove: normalize_user_slugs(self.users_to_remove)?,
        })
    }
}

fn normalize_name(name: String) -> Result<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(LibError::invalid(
            "User group name is required",
            anyhow!("empty user group name"),
        ));
    }
    Ok(name)
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn normalize_slug(slug: String) -> Result<String> {
    let slug = slug.trim().to_string();
    if slug.is_empty() {
        return Err(LibError::invalid_with_code(
            "invalid_slug",
            "User group slug is required",
            anyhow!("empty user group slug"),
        ));
    }
    if !is_valid_slug(&slug) {
        return Err(LibError::invalid_with_code(
            "invalid_slug",
            "User group slug may only contain letters, digits, '-' and '_'",
            anyhow!("invalid user group slug {:?}", slug),
        ));
    }
    Ok(slug)
}

fn normalize_user_slugs(slugs: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(slugs.len());
    let mut output = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let slug = slug.trim().to_string();
        if slug.is_empty() {
            return Err(LibError::invalid(
                "User slugs cannot be blank",
                anyhow!("blank user slug in membership list"),
            ));
        }
        if seen.insert(slug.clone()) {
            output.push(slug);
        }
    }
    Ok(output)
}

/// Builds an `ILIKE` pattern matching `text` anywhere, with the pattern
/// metacharacters escaped so they only match themselves.
pub fn like_contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
