//! Rotation Planner.
//!
//! Pure and deterministic: given the current worker inventory, produces a
//! [`Schedule`] of [`Group`]s. Replanning with the same inventory yields
//! identical groups and offsets because group membership is always a
//! contiguous slice of the id-sorted inventory, never a random or
//! hash-order split.

use serde::{Deserialize, Serialize};

use fleet_core::types::{Provider, Worker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub workers: Vec<i64>,
    pub provider: GroupProvider,
    pub duration_hours: f64,
    pub start_offset_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupProvider {
    C,
    K,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub min_online: usize,
    pub max_online: usize,
    pub average_online: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub groups: Vec<Group>,
    pub estimated_coverage: Coverage,
}

/// C session safe cap in hours, per `fleet_core::quota::SESSION_SAFE_CAP_SECS`.
const C_DURATION_HOURS: f64 = fleet_core::quota::SESSION_SAFE_CAP_SECS as f64 / 3600.0;
const K_DURATION_HOURS: f64 = 4.0;

/// Split a sorted id list into `n` contiguous, as-even-as-possible slices.
/// Empty slices are dropped: a group with zero workers carries no signal
/// and would only pollute coverage estimation.
fn contiguous_slices(ids: &[i64], n: usize) -> Vec<Vec<i64>> {
    if n == 0 || ids.is_empty() {
        return Vec::new();
    }
    let n = n.min(ids.len()).max(1);
    let base = ids.len() / n;
    let remainder = ids.len() % n;
    let mut slices = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let extra = if i < remainder { 1 } else { 0 };
        let len = base + extra;
        if len == 0 {
            continue;
        }
        slices.push(ids[start..start + len].to_vec());
        start += len;
    }
    slices
}

fn sorted_ids(workers: &[Worker], provider: Provider) -> Vec<i64> {
    let mut ids: Vec<i64> = workers
        .iter()
        .filter(|w| w.provider == provider)
        .map(|w| w.id)
        .collect();
    ids.sort_unstable();
    ids
}

fn make_groups(
    prefix: &str,
    ids_slices: Vec<Vec<i64>>,
    provider: GroupProvider,
    duration_hours: f64,
    offsets: &[f64],
) -> Vec<Group> {
    ids_slices
        .into_iter()
        .zip(offsets.iter())
        .enumerate()
        .map(|(i, (workers, offset))| Group {
            group_id: format!("{prefix}-{i}"),
            workers,
            provider,
            duration_hours,
            start_offset_hours: *offset,
        })
        .collect()
}

/// Strategy selection, keyed on `(cCount, kCount)`.
pub fn plan(workers: &[Worker]) -> Schedule {
    let c_ids = sorted_ids(workers, Provider::C);
    let k_ids = sorted_ids(workers, Provider::K);
    let c_count = c_ids.len();
    let k_count = k_ids.len();

    let mut groups = Vec::new();

    if c_count >= 6 {
        groups.extend(make_groups(
            "c",
            contiguous_slices(&c_ids, 3),
            GroupProvider::C,
            C_DURATION_HOURS,
            &[0.0, 4.0, 8.0],
        ));
        if k_count > 0 {
            groups.extend(make_groups(
                "k",
                contiguous_slices(&k_ids, 3),
                GroupProvider::K,
                K_DURATION_HOURS,
                &[2.0, 10.0, 18.0],
            ));
        }
    } else if c_count >= 3 {
        groups.extend(make_groups(
            "c",
            contiguous_slices(&c_ids, 2),
            GroupProvider::C,
            C_DURATION_HOURS,
            &[0.0, 6.0],
        ));
        if k_count > 0 {
            groups.extend(make_groups(
                "k",
                contiguous_slices(&k_ids, 2),
                GroupProvider::K,
                K_DURATION_HOURS,
                &[3.0, 15.0],
            ));
        }
    } else if c_count >= 1 {
        groups.extend(make_groups(
            "c",
            contiguous_slices(&c_ids, 1),
            GroupProvider::C,
            C_DURATION_HOURS,
            &[0.0],
        ));
        if k_count > 0 {
            groups.extend(make_groups(
                "k",
                contiguous_slices(&k_ids, k_count.min(3)),
                GroupProvider::K,
                K_DURATION_HOURS,
                &[2.0, 10.0, 18.0],
            ));
        }
    } else if k_count > 0 {
        let n_groups = k_count.min(6);
        let all_offsets = [0.0, 4.0, 8.0, 12.0, 16.0, 20.0];
        groups.extend(make_groups(
            "k",
            contiguous_slices(&k_ids, n_groups),
            GroupProvider::K,
            K_DURATION_HOURS,
            &all_offsets[..n_groups],
        ));
    }

    let estimated_coverage = estimate_coverage(&groups);

    Schedule {
        groups,
        estimated_coverage,
    }
}

/// Samples online worker counts every 0.1h across a 24h wall-clock cycle
/// and reports the min/max/average across those samples.
fn estimate_coverage(groups: &[Group]) -> Coverage {
    if groups.is_empty() {
        return Coverage {
            min_online: 0,
            max_online: 0,
            average_online: 0.0,
        };
    }

    const STEPS: usize = 240; // 24h / 0.1h
    let mut min_online = usize::MAX;
    let mut max_online = 0usize;
    let mut total = 0usize;

    for step in 0..STEPS {
        let hour = step as f64 * 0.1;
        let online: usize = groups
            .iter()
            .filter(|g| {
                let end = g.start_offset_hours + g.duration_hours;
                hour >= g.start_offset_hours && hour < end
            })
            .map(|g| g.workers.len())
            .sum();
        min_online = min_online.min(online);
        max_online = max_online.max(online);
        total += online;
    }

    Coverage {
        min_online,
        max_online,
        average_online: total as f64 / STEPS as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_core::types::{Capabilities, WorkerStatus};

    fn worker(id: i64, provider: Provider) -> Worker {
        let now = Utc::now();
        Worker {
            id,
            provider,
            account_id: format!("{provider}-{id}"),
            tunnel_url: None,
            status: WorkerStatus::Offline,
            capabilities: Capabilities::default(),
            auto_managed: true,
            last_used_at: None,
            session_started_at: None,
            session_duration_seconds: 0,
            max_session_duration_seconds: 0,
            weekly_usage_seconds: 0,
            max_weekly_seconds: None,
            week_started_at: None,
            cooldown_until: None,
            scheduled_stop_at: None,
            provider_limits: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn three_c_two_k_picks_the_two_group_strategy() {
        // {C:3, K:2}.
        let workers: Vec<Worker> = (1..=3)
            .map(|i| worker(i, Provider::C))
            .chain((4..=5).map(|i| worker(i, Provider::K)))
            .collect();
        let schedule = plan(&workers);

        let c_groups: Vec<&Group> = schedule
            .groups
            .iter()
            .filter(|g| g.provider == GroupProvider::C)
            .collect();
        assert_eq!(c_groups.len(), 2);
        assert_eq!(c_groups[0].start_offset_hours, 0.0);
        assert_eq!(c_groups[1].start_offset_hours, 6.0);
        for g in &c_groups {
            assert!((g.duration_hours - 8.4).abs() < 1e-9);
        }

        let k_groups: Vec<&Group> = schedule
            .groups
            .iter()
            .filter(|g| g.provider == GroupProvider::K)
            .collect();
        assert_eq!(k_groups.len(), 2);
        assert_eq!(k_groups[0].start_offset_hours, 3.0);
        assert_eq!(k_groups[1].start_offset_hours, 15.0);
    }

    #[test]
    fn three_group_strategy_when_six_or_more_c() {
        let workers: Vec<Worker> = (1..=6).map(|i| worker(i, Provider::C)).collect();
        let schedule = plan(&workers);
        let c_groups: Vec<&Group> = schedule
            .groups
            .iter()
            .filter(|g| g.provider == GroupProvider::C)
            .collect();
        assert_eq!(c_groups.len(), 3);
        let offsets: Vec<f64> = c_groups.iter().map(|g| g.start_offset_hours).collect();
        assert_eq!(offsets, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn mixed_strategy_single_c_backbone() {
        let workers: Vec<Worker> = vec![worker(1, Provider::C)]
            .into_iter()
            .chain((2..=4).map(|i| worker(i, Provider::K)))
            .collect();
        let schedule = plan(&workers);
        let c_groups: Vec<&Group> = schedule
            .groups
            .iter()
            .filter(|g| g.provider == GroupProvider::C)
            .collect();
        assert_eq!(c_groups.len(), 1);
        assert_eq!(c_groups[0].workers, vec![1]);

        let k_groups: Vec<&Group> = schedule
            .groups
            .iter()
            .filter(|g| g.provider == GroupProvider::K)
            .collect();
        assert_eq!(k_groups.len(), 3);
    }

    #[test]
    fn k_only_strategy_divides_into_up_to_six_groups() {
        let workers: Vec<Worker> = (1..=8).map(|i| worker(i, Provider::K)).collect();
        let schedule = plan(&workers);
        assert_eq!(schedule.groups.len(), 6);
        let offsets: Vec<f64> = schedule.groups.iter().map(|g| g.start_offset_hours).collect();
        assert_eq!(offsets, vec![0.0, 4.0, 8.0, 12.0, 16.0, 20.0]);
    }

    #[test]
    fn empty_inventory_yields_empty_schedule() {
        let schedule = plan(&[]);
        assert!(schedule.groups.is_empty());
        assert_eq!(schedule.estimated_coverage.max_online, 0);
    }

    #[test]
    fn replanning_same_inventory_is_stable() {
        let workers: Vec<Worker> = (1..=5)
            .map(|i| worker(i, Provider::C))
            .chain((6..=9).map(|i| worker(i, Provider::K)))
            .collect();
        let a = plan(&workers);
        let b = plan(&workers);
        assert_eq!(a, b);
    }

    #[test]
    fn groups_are_contiguous_slices_of_sorted_ids() {
        let workers: Vec<Worker> = (100..=105).map(|i| worker(i, Provider::C)).collect();
        let schedule = plan(&workers);
        let mut all_ids: Vec<i64> = schedule.groups.iter().flat_map(|g| g.workers.clone()).collect();
        all_ids.sort_unstable();
        assert_eq!(all_ids, (100..=105).collect::<Vec<_>>());
    }
}
