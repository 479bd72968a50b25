use std::collections::{HashMap, HashSet};

use crate::models::{Paged, Pagination, SlugMapRow, UserGroupAdminView};

/// Folds flat group/member rows into one view per group and returns the
/// requested page of groups.
///
/// Groups keep the order in which they first appear in `rows`, so callers
/// control the listing order through the driving query. `total_count` counts
/// groups, not rows.
pub fn sort_users_into_groups(
    rows: impl IntoIterator<Item = SlugMapRow>,
    pagination: Pagination,
) -> Paged<UserGroupAdminView> {
    let mut groups: Vec<UserGroupAdminView> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut members: Vec<HashSet<String>> = Vec::new();

    for row in rows {
        let idx = match group_index.get(&row.group_slug) {
            Some(idx) => *idx,
            None => {
                let idx = groups.len();
                group_index.insert(row.group_slug.clone(), idx);
                // Deletion is a group-level fact; the first row decides it.
                groups.push(UserGroupAdminView {
                    name: row.group_name,
                    slug: row.group_slug,
                    deleted: row.deleted_at.is_some(),
                    user_slugs: Vec::new(),
                });
                members.push(HashSet::new());
                idx
            }
        };

        let Some(user_slug) = row.user_slug.filter(|slug| !slug.is_empty()) else {
            continue;
        };
        if members[idx].insert(user_slug.clone()) {
            groups[idx].user_slugs.push(user_slug);
        }
    }

    let total_count = groups.len() as u64;
    let content = groups
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.page_size as usize)
        .collect();

    Paged {
        page: pagination.page,
        page_size: pagination.page_size,
        total_count,
        content,
    }
}

/// Membership writes needed to converge a group on
/// `(current ∪ adds) \ removes`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipPlan {
    pub to_insert: Vec<String>,
    pub to_delete: Vec<String>,
    pub final_members: Vec<String>,
}

impl MembershipPlan {
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}

/// Plans a membership change. A slug listed in both `adds` and `removes`
/// ends up removed. Adding a present member or removing an absent one
/// produces no write.
pub fn plan_membership_change(
    current: &[String],
    adds: &[String],
    removes: &[String],
) -> MembershipPlan {
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let remove_set: HashSet<&str> = removes.iter().map(String::as_str).collect();

    let mut queued: HashSet<&str> = HashSet::with_capacity(adds.len());
    let mut to_insert = Vec::new();
    for slug in adds {
        let slug = slug.as_str();
        if current_set.contains(slug) || remove_set.contains(slug) {
            continue;
        }
        if queued.insert(slug) {
            to_insert.push(slug.to_string());
        }
    }

    let mut dropped: HashSet<&str> = HashSet::with_capacity(removes.len());
    let mut to_delete = Vec::new();
    for slug in removes {
        let slug = slug.as_str();
        if current_set.contains(slug) && dropped.insert(slug) {
            to_delete.push(slug.to_string());
        }
    }

    let final_members = current
        .iter()
        .filter(|slug| !remove_set.contains(slug.as_str()))
        .chain(to_insert.iter())
        .cloned()
        .collect();

    MembershipPlan {
        to_insert,
        to_delete,
        final_members,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::NaiveDate;

    use super::{plan_membership_change, sort_users_into_groups};
    use crate::models::{Pagination, SlugMapRow};

    fn row(user: Option<&str>, group_slug: &str, group_name: &str) -> SlugMapRow {
        SlugMapRow {
            user_slug: user.map(str::to_string),
            group_slug: group_slug.to_string(),
            group_name: group_name.to_string(),
            deleted_at: None,
        }
    }

    fn deleted_row(user: Option<&str>, group_slug: &str, group_name: &str) -> SlugMapRow {
        let deleted_at = NaiveDate::from_ymd_opt(2026, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid datetime");
        SlugMapRow {
            deleted_at: Some(deleted_at),
            ..row(user, group_slug, group_name)
        }
    }

    fn hogwarts_rows() -> Vec<SlugMapRow> {
        vec![
            row(Some("harry"), "gryffindor", "Gryffindor"),
            row(Some("ron"), "gryffindor", "Gryffindor"),
            row(Some("ginny"), "gryffindor", "Gryffindor"),
            row(Some("hermione"), "gryffindor", "Gryffindor"),
            row(Some("cedric"), "hufflepuff", "Hufflepuff"),
            row(Some("fleur"), "hufflepuff", "Hufflepuff"),
            deleted_row(None, "otherhouse", "OtherHouse"),
            row(Some("viktor"), "ravenclaw", "Ravenclaw"),
            row(Some("cho"), "ravenclaw", "Ravenclaw"),
            row(Some("draco"), "slytherin", "Slytherin"),
            row(Some("snape"), "slytherin", "Slytherin"),
            row(Some("lucius"), "slytherin", "Slytherin"),
        ]
    }

    fn slug_set(slugs: &[String]) -> HashSet<&str> {
        slugs.iter().map(String::as_str).collect()
    }

    fn owned(slugs: &[&str]) -> Vec<String> {
        slugs.iter().map(|slug| slug.to_string()).collect()
    }

    #[test]
    fn groups_rows_in_arrival_order() {
        let rows = hogwarts_rows();
        assert_eq!(rows.len(), 12);

        let paged = sort_users_into_groups(rows, Pagination::new(1, 10));
        assert_eq!(paged.total_count, 5);

        let slugs: Vec<&str> = paged.content.iter().map(|g| g.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec!["gryffindor", "hufflepuff", "otherhouse", "ravenclaw", "slytherin"]
        );

        let gryffindor = &paged.content[0];
        assert_eq!(gryffindor.name, "Gryffindor");
        assert!(!gryffindor.deleted);
        assert_eq!(
            slug_set(&gryffindor.user_slugs),
            HashSet::from(["harry", "ron", "ginny", "hermione"])
        );

        assert_eq!(
            slug_set(&paged.content[4].user_slugs),
            HashSet::from(["draco", "snape", "lucius"])
        );
    }

    #[test]
    fn keeps_empty_groups_and_flags_deleted() {
        let paged = sort_users_into_groups(hogwarts_rows(), Pagination::new(1, 10));
        let other: Vec<_> = paged
            .content
            .iter()
            .filter(|g| g.slug == "otherhouse")
            .collect();
        assert_eq!(other.len(), 1);
        assert!(other[0].user_slugs.is_empty());
        assert!(other[0].deleted);
        assert!(paged.content.iter().filter(|g| g.deleted).count() == 1);
    }

    #[test]
    fn empty_input_yields_empty_page() {
        let paged = sort_users_into_groups(Vec::<SlugMapRow>::new(), Pagination::new(1, 10));
        assert_eq!(paged.total_count, 0);
        assert!(paged.content.is_empty());
    }

    #[test]
    fn single_group_of_null_rows_has_no_members() {
        let rows = vec![
            row(None, "otherhouse", "OtherHouse"),
            row(Some(""), "otherhouse", "OtherHouse"),
        ];
        let paged = sort_users_into_groups(rows, Pagination::new(1, 10));
        assert_eq!(paged.total_count, 1);
        assert_eq!(paged.content.len(), 1);
        assert!(paged.content[0].user_slugs.is_empty());
    }

    #[test]
    fn deduplicates_members_and_handles_unsorted_rows() {
        let rows = vec![
            row(Some("draco"), "slytherin", "Slytherin"),
            row(Some("harry"), "gryffindor", "Gryffindor"),
            row(Some("draco"), "slytherin", "Slytherin"),
            row(Some("snape"), "slytherin", "Slytherin"),
        ];
        let paged = sort_users_into_groups(rows, Pagination::new(1, 10));
        assert_eq!(paged.total_count, 2);
        assert_eq!(paged.content[0].slug, "slytherin");
        assert_eq!(paged.content[0].user_slugs, vec!["draco", "snape"]);
        assert_eq!(paged.content[1].user_slugs, vec!["harry"]);
    }

    #[test]
    fn paginates_over_groups_not_rows() {
        let first = sort_users_into_groups(hogwarts_rows(), Pagination::new(1, 2));
        assert_eq!(first.total_count, 5);
        assert_eq!(first.content.len(), 2);
        assert_eq!(first.content[0].user_slugs.len(), 4);
        assert_eq!(first.content[1].slug, "hufflepuff");

        let last = sort_users_into_groups(hogwarts_rows(), Pagination::new(3, 2));
        assert_eq!(last.content.len(), 1);
        assert_eq!(last.content[0].slug, "slytherin");
        assert_eq!(last.page, 3);

        let past_end = sort_users_into_groups(hogwarts_rows(), Pagination::new(4, 2));
        assert_eq!(past_end.total_count, 5);
        assert!(past_end.content.is_empty());
    }

    #[test]
    fn adding_members_grows_group_without_duplicates() {
        let current = owned(&["harry", "ron", "hermione", "ginny"]);
        let plan = plan_membership_change(&current, &owned(&["alastor", "hagrid"]), &[]);

        assert_eq!(plan.to_insert, owned(&["alastor", "hagrid"]));
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.final_members.len(), 6);
        assert!(slug_set(&current).is_subset(&slug_set(&plan.final_members)));
    }

    #[test]
    fn modify_converges_on_union_minus_removals() {
        let current = owned(&["harry", "ron", "hermione", "ginny"]);
        let plan = plan_membership_change(
            &current,
            &owned(&["alastor", "hagrid"]),
            &owned(&["ron", "hermione"]),
        );

        assert_eq!(
            slug_set(&plan.final_members),
            HashSet::from(["harry", "ginny", "alastor", "hagrid"])
        );
        assert_eq!(plan.to_delete, owned(&["ron", "hermione"]));
    }

    #[test]
    fn removal_wins_when_slug_is_added_and_removed() {
        let current = owned(&["harry", "ron"]);
        let plan = plan_membership_change(
            &current,
            &owned(&["ron", "alastor"]),
            &owned(&["ron", "alastor"]),
        );

        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.to_delete, owned(&["ron"]));
        assert_eq!(plan.final_members, owned(&["harry"]));
    }

    #[test]
    fn re_adding_and_re_removing_are_noops() {
        let current = owned(&["harry", "ron"]);
        let plan = plan_membership_change(&current, &owned(&["harry"]), &owned(&["draco"]));

        assert!(plan.is_noop());
        assert_eq!(plan.final_members, current);
    }
}
