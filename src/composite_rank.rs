use std::cmp::Ordering;

use crate::merge::{MergedTeamRecord, TeamMetrics};
use crate::model::Metric;

// Averages are compared at 4 decimal places so float noise never splits a tie.
const AVG_SCALE: f64 = 10_000.0;

/// Returns `records` annotated with `avg_rank` and its competition ("1224") rank.
///
/// Input order is preserved. Any previous annotation is replaced, so this can be re-run
/// with a different `metrics` subset on the same merged table.
pub fn compute_avg_rank(records: &[MergedTeamRecord], metrics: &[Metric]) -> Vec<MergedTeamRecord> {
    let mut out = records.to_vec();
    let mut keyed: Vec<(i64, usize)> = Vec::new();
    for (idx, record) in out.iter_mut().enumerate() {
        let key = average_rank(&record.metrics, metrics).map(avg_key);
        record.avg_rank = key.map(|k| k as f64 / AVG_SCALE);
        record.avg_rank_tie_group = None;
        if let Some(key) = key {
            keyed.push((key, idx));
        }
    }

    keyed.sort_unstable();
    let mut group = 0u32;
    let mut prev: Option<i64> = None;
    for (pos, (key, idx)) in keyed.iter().enumerate() {
        if prev != Some(*key) {
            group = u32::try_from(pos + 1).unwrap_or(u32::MAX);
            prev = Some(*key);
        }
        out[*idx].avg_rank_tie_group = Some(group);
    }
    out
}

/// Mean of the present values among `metrics`; `None` when none are present.
pub fn average_rank(values: &TeamMetrics, metrics: &[Metric]) -> Option<f64> {
    let mut seen: Vec<Metric> = Vec::with_capacity(metrics.len());
    let mut sum = 0.0;
    let mut n = 0usize;
    for metric in metrics {
        if seen.contains(metric) {
            continue;
        }
        seen.push(*metric);
        if let Some(rank) = values.get(*metric) {
            sum += f64::from(rank);
            n += 1;
        }
    }
    if n == 0 { None } else { Some(sum / n as f64) }
}

fn avg_key(avg: f64) -> i64 {
    (avg * AVG_SCALE).round() as i64
}

/// Dashboard order: by composite rank, then average, then team; unranked teams last.
pub fn ranked_order(records: &[MergedTeamRecord]) -> Vec<&MergedTeamRecord> {
    let mut out: Vec<&MergedTeamRecord> = records.iter().collect();
    out.sort_by(|a, b| {
        match (a.avg_rank_tie_group, b.avg_rank_tie_group) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| {
            a.avg_rank
                .partial_cmp(&b.avg_rank)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.team.cmp(&b.team))
    });
    out
}
