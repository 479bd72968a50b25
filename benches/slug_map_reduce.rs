use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use subseq_user_groups::algorithms::{plan_membership_change, sort_users_into_groups};
use subseq_user_groups::models::{Pagination, SlugMapRow};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// Rows shaped like the admin listing query: grouped by group, a share of
/// groups empty and a share soft-deleted.
fn synthetic_slug_map(group_count: usize, max_members: usize) -> Vec<SlugMapRow> {
    let mut state = 0x1234_5678_9abc_def0u64;
    let mut rows = Vec::with_capacity(group_count * max_members / 2);
    for group in 0..group_count {
        let group_slug = format!("group-{group:05}");
        let group_name = format!("Group {group:05}");
        let deleted_at = if lcg_next(&mut state) % 10 == 0 {
            chrono::NaiveDate::from_ymd_opt(2026, 1, 1).and_then(|day| day.and_hms_opt(0, 0, 0))
        } else {
            None
        };
        let members = (lcg_next(&mut state) as usize) % (max_members + 1);

        if members == 0 {
            rows.push(SlugMapRow {
                user_slug: None,
                group_slug,
                group_name,
                deleted_at,
            });
            continue;
        }

        for _ in 0..members {
            let user = (lcg_next(&mut state) as usize) % (group_count * 4);
            rows.push(SlugMapRow {
                user_slug: Some(format!("user-{user:06}")),
                group_slug: group_slug.clone(),
                group_name: group_name.clone(),
                deleted_at,
            });
        }
    }
    rows
}

fn bench_sort_users_into_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_users_into_groups");
    for (groups, members) in [(100usize, 20usize), (2_000usize, 50usize)] {
        let rows = synthetic_slug_map(groups, members);

        group.throughput(Throughput::Elements(rows.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("first_page", format!("{groups}g_{}r", rows.len())),
            &rows,
            |b, rows| {
                b.iter(|| {
                    black_box(sort_users_into_groups(
                        rows.iter().cloned(),
                        Pagination::new(1, 25),
                    ))
                });
            },
        );
    }
    group.finish();
}

fn bench_plan_membership_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_membership_change");
    for members in [100usize, 5_000usize] {
        let current = (0..members)
            .map(|idx| format!("user-{idx:06}"))
            .collect::<Vec<_>>();
        let adds = (members / 2..members + members / 2)
            .map(|idx| format!("user-{idx:06}"))
            .collect::<Vec<_>>();
        let removes = (0..members / 4)
            .map(|idx| format!("user-{:06}", idx * 3))
            .collect::<Vec<_>>();

        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(
            BenchmarkId::new("overlapping", format!("{members}m")),
            &(current, adds, removes),
            |b, (current, adds, removes)| {
                b.iter(|| black_box(plan_membership_change(current, adds, removes)));
            },
        );
    }
    group.finish();
}

criterion_group!(
    slug_map_reduce,
    bench_sort_users_into_groups,
    bench_plan_membership_change
);
criterion_main!(slug_map_reduce);
