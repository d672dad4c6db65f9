//! Route change detection over a bounded window of traces per target.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{Measurement, mean, round2};
use crate::config::ProbeTarget;
use crate::error::ProbeError;
use crate::probe::{RouteSnapshot, TraceOutcome};
use crate::sensor::{SensorStatus, SensorValue};

/// Recent snapshots per target, oldest first
///
/// Owned by the coordinator and kept across configuration replacements.
#[derive(Debug, Default)]
pub struct RouteHistory {
    windows: Mutex<HashMap<String, VecDeque<RouteSnapshot>>>,
}

/// A target's window after this run's trace, or why the trace failed
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWindow {
    pub target: ProbeTarget,
    pub window: Result<Vec<RouteSnapshot>, ProbeError>,
}

impl RouteHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `snapshot`, evicting the oldest beyond `capacity`
    pub fn record(&self, target: &str, snapshot: RouteSnapshot, capacity: usize) -> Vec<RouteSnapshot> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(target.to_string()).or_default();
        window.push_back(snapshot);
        while window.len() > capacity.max(1) {
            window.pop_front();
        }
        window.iter().cloned().collect()
    }

    pub fn window(&self, target: &str) -> Vec<RouteSnapshot> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.get(target).map(|window| window.iter().cloned().collect()).unwrap_or_default()
    }

    /// Forget targets no longer configured
    pub fn retain_targets(&self, targets: &[ProbeTarget]) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|address, _| targets.iter().any(|target| &target.address == address));
    }

    /// Record every successful trace and pair each target with its window
    pub fn record_outcomes(&self, outcomes: Vec<TraceOutcome>, capacity: usize) -> Vec<TargetWindow> {
        outcomes
            .into_iter()
            .map(|outcome| {
                let window = outcome
                    .result
                    .map(|snapshot| self.record(&outcome.target.address, snapshot, capacity));
                TargetWindow { target: outcome.target, window }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopDetail {
    pub index: u32,
    pub address: Option<String>,
    pub rtt_ms: Option<f64>,

    /// Address differs from the previous snapshot at this position
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStability {
    /// 1.0 when the last two snapshots agree at every position
    pub score: f64,
    pub changes: usize,
    pub hop_count: usize,
    pub stable_hops: usize,
    pub unstable_hops: usize,
    pub new_hops: usize,
    pub missing_hops: usize,

    /// Fewer than two snapshots; the score of 1.0 is a default, not evidence
    pub insufficient_history: bool,
    pub hop_detail: Vec<HopDetail>,
}

/// Compare the newest snapshot with the one before it
///
/// Positions are hop indices. A position present in only one snapshot
/// counts as a change; a silent hop (`*`) compares equal only to another
/// silent hop.
pub fn stability(history: &[RouteSnapshot]) -> RouteStability {
    let Some(current) = history.last() else {
        return RouteStability {
            score: 1.0,
            changes: 0,
            hop_count: 0,
            stable_hops: 0,
            unstable_hops: 0,
            new_hops: 0,
            missing_hops: 0,
            insufficient_history: true,
            hop_detail: Vec::new(),
        };
    };
    let previous = history.len().checked_sub(2).map(|index| &history[index]);

    let hop_detail: Vec<HopDetail> = current
        .hops
        .iter()
        .map(|hop| HopDetail {
            index: hop.index,
            address: hop.address.clone(),
            rtt_ms: hop.rtt_ms,
            changed: previous.is_some_and(|previous| {
                previous.hop(hop.index).is_none_or(|before| before.address != hop.address)
            }),
        })
        .collect();

    let Some(previous) = previous else {
        return RouteStability {
            score: 1.0,
            changes: 0,
            hop_count: current.hop_count(),
            stable_hops: current.hop_count(),
            unstable_hops: 0,
            new_hops: 0,
            missing_hops: 0,
            insufficient_history: true,
            hop_detail,
        };
    };

    let positions: BTreeSet<u32> = current
        .hops
        .iter()
        .chain(previous.hops.iter())
        .map(|hop| hop.index)
        .collect();

    let (mut stable, mut unstable, mut new, mut missing) = (0, 0, 0, 0);
    for position in &positions {
        match (previous.hop(*position), current.hop(*position)) {
            (Some(before), Some(after)) if before.address == after.address => stable += 1,
            (Some(_), Some(_)) => unstable += 1,
            (None, Some(_)) => new += 1,
            (Some(_), None) => missing += 1,
            (None, None) => {}
        }
    }

    let changes = unstable + new + missing;
    let score = if positions.is_empty() { 1.0 } else { 1.0 - changes as f64 / positions.len() as f64 };

    RouteStability {
        score,
        changes,
        hop_count: current.hop_count(),
        stable_hops: stable,
        unstable_hops: unstable,
        new_hops: new,
        missing_hops: missing,
        insufficient_history: false,
        hop_detail,
    }
}

/// Mean stability score across targets that traced this run
pub fn route_stability(results: &[TargetWindow]) -> Measurement {
    let mut targets = Map::new();
    let mut scores = Vec::new();
    let mut failures = Vec::new();
    let mut first_error = None;

    for result in results {
        let detail = match &result.window {
            Ok(window) => {
                let analysis = stability(window);
                scores.push(analysis.score);
                let mut detail = serde_json::to_value(&analysis).unwrap_or(Value::Null);
                if let Value::Object(fields) = &mut detail {
                    fields.insert("score".to_string(), Value::from(round2(analysis.score)));
                    fields.insert("address".to_string(), Value::from(result.target.address.clone()));
                    fields.insert("snapshots".to_string(), Value::from(window.len()));
                }
                detail
            }
            Err(error) => {
                failures.push(format!("{}: {error}", result.target.label));
                first_error.get_or_insert(error);
                json!({ "address": result.target.address, "error": error.to_string() })
            }
        };
        targets.insert(result.target.label.clone(), detail);
    }

    let Some(state) = mean(&scores) else {
        let measurement = match first_error {
            Some(error) => Measurement::from_error(error),
            None => Measurement::failed("resource_unavailable", "no route targets configured"),
        };
        return measurement
            .with(super::ERROR_KEY, failures.join("; "))
            .with("targets", Value::Object(targets));
    };

    let status = SensorStatus::from_counts(scores.len(), results.len());
    let measurement = Measurement::new(SensorValue::Number(round2(state)), status)
        .with("targets", Value::Object(targets));
    if failures.is_empty() { measurement } else { measurement.with(super::ERROR_KEY, failures.join("; ")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Hop;

    fn snapshot(addresses: &[Option<&str>]) -> RouteSnapshot {
        RouteSnapshot::new(
            addresses
                .iter()
                .enumerate()
                .map(|(position, address)| Hop {
                    index: position as u32 + 1,
                    address: address.map(str::to_string),
                    rtt_ms: address.map(|_| 1.0),
                })
                .collect(),
        )
    }

    fn route(count: usize) -> Vec<Option<String>> {
        (1..=count).map(|hop| Some(format!("10.0.{hop}.1"))).collect()
    }

    fn to_snapshot(route: &[Option<String>]) -> RouteSnapshot {
        let borrowed: Vec<Option<&str>> = route.iter().map(|address| address.as_deref()).collect();
        snapshot(&borrowed)
    }

    #[test]
    fn test_identical_snapshots_are_stable() {
        let base = to_snapshot(&route(10));
        let analysis = stability(&[base.clone(), base]);

        assert_eq!(analysis.score, 1.0);
        assert_eq!(analysis.changes, 0);
        assert_eq!(analysis.stable_hops, 10);
        assert!(!analysis.insufficient_history);
        assert!(analysis.hop_detail.iter().all(|hop| !hop.changed));
    }

    #[test]
    fn test_one_changed_hop_of_ten() {
        let before = route(10);
        let mut after = before.clone();
        after[4] = Some("10.9.9.9".to_string());
        let analysis = stability(&[to_snapshot(&before), to_snapshot(&after)]);

        assert!((analysis.score - 0.9).abs() < 1e-9);
        assert_eq!(analysis.changes, 1);
        assert_eq!(analysis.unstable_hops, 1);
        assert!(analysis.hop_detail[4].changed);
        assert_eq!(analysis.hop_count, 10);
    }

    #[test]
    fn test_only_newest_pair_is_compared() {
        let mut odd = route(4);
        odd[0] = Some("192.0.2.1".to_string());
        let analysis = stability(&[to_snapshot(&odd), to_snapshot(&route(4)), to_snapshot(&route(4))]);
        assert_eq!(analysis.score, 1.0);
    }

    #[test]
    fn test_hop_count_change_counts_as_change() {
        let analysis = stability(&[to_snapshot(&route(8)), to_snapshot(&route(10))]);
        assert_eq!(analysis.new_hops, 2);
        assert!((analysis.score - 0.8).abs() < 1e-9);

        let analysis = stability(&[to_snapshot(&route(10)), to_snapshot(&route(9))]);
        assert_eq!(analysis.missing_hops, 1);
        assert_eq!(analysis.changes, 1);
    }

    #[test]
    fn test_silent_hops_compare_by_equality() {
        let quiet = snapshot(&[Some("10.0.0.1"), None, Some("10.0.0.3")]);
        assert_eq!(stability(&[quiet.clone(), quiet.clone()]).score, 1.0);

        let answered = snapshot(&[Some("10.0.0.1"), Some("10.0.0.2"), Some("10.0.0.3")]);
        assert_eq!(stability(&[quiet, answered]).unstable_hops, 1);
    }

    #[test]
    fn test_short_history_defaults_to_one() {
        let analysis = stability(&[to_snapshot(&route(5))]);
        assert_eq!(analysis.score, 1.0);
        assert!(analysis.insufficient_history);
        assert_eq!(analysis.hop_count, 5);

        assert!(stability(&[]).insufficient_history);
    }

    #[test]
    fn test_history_is_bounded() {
        let history = RouteHistory::new();
        for hops in 1..=7 {
            history.record("google.com", to_snapshot(&route(hops)), 5);
        }
        let window = history.window("google.com");
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].hop_count(), 3);

        history.retain_targets(&[ProbeTarget::new("cloudflare.com")]);
        assert!(history.window("google.com").is_empty());
    }

    #[test]
    fn test_route_stability_reading() {
        let history = RouteHistory::new();
        let outcomes = vec![
            TraceOutcome { target: ProbeTarget::new("a"), result: Ok(to_snapshot(&route(4))) },
            TraceOutcome {
                target: ProbeTarget::new("b"),
                result: Err(ProbeError::Unreachable("b: no hops traced".into())),
            },
        ];
        let measurement = route_stability(&history.record_outcomes(outcomes, 5));

        assert_eq!(measurement.state, SensorValue::Number(1.0));
        assert_eq!(measurement.status, SensorStatus::Degraded);
        assert_eq!(measurement.attributes["targets"]["a"]["insufficient_history"], true);
        assert_eq!(measurement.attributes["targets"]["a"]["hop_detail"][0]["index"], 1);
        assert!(measurement.attributes["targets"]["b"]["error"].is_string());
    }
}
