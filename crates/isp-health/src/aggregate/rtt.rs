use serde_json::{Map, Value, json};

use super::{Measurement, mean, round2};
use crate::probe::TargetSamples;
use crate::sensor::{SensorStatus, SensorValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Min/max/mean of reply times; `None` when nothing answered
pub fn summarize(replies: &[f64]) -> Option<RttSummary> {
    let avg = mean(replies)?;
    let min = replies.iter().copied().fold(f64::INFINITY, f64::min);
    let max = replies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(RttSummary { min, max, avg })
}

/// Mean absolute difference between consecutive replies
///
/// Needs at least two replies.
pub fn jitter_ms(replies: &[f64]) -> Option<f64> {
    let diffs: Vec<f64> = replies.windows(2).map(|pair| (pair[1] - pair[0]).abs()).collect();
    mean(&diffs)
}

/// Share of attempts without a reply, in percent
pub fn loss_pct(samples: &TargetSamples) -> f64 {
    if samples.samples.is_empty() {
        return 100.0;
    }
    samples.lost() as f64 / samples.samples.len() as f64 * 100.0
}

fn failure_summary(results: &[TargetSamples], failed: impl Fn(&TargetSamples) -> bool) -> Option<String> {
    let failures: Vec<String> = results
        .iter()
        .filter(|result| failed(result))
        .map(|result| match &result.error {
            Some(error) => format!("{}: {error}", result.target.label),
            None => format!("{}: no reply", result.target.label),
        })
        .collect();
    (!failures.is_empty()).then(|| failures.join("; "))
}

fn no_reply(results: &[TargetSamples]) -> Measurement {
    let error = results.iter().find_map(|result| result.error.as_ref());
    let kind = error.map(|error| error.kind()).unwrap_or("timeout");
    let message = failure_summary(results, |_| true).unwrap_or_else(|| "no targets probed".to_string());
    Measurement::failed(kind, message)
}

fn finish(measurement: Measurement, error: Option<String>, targets: Map<String, Value>) -> Measurement {
    let measurement = measurement.with("targets", Value::Object(targets));
    match error {
        Some(error) => measurement.with(super::ERROR_KEY, error),
        None => measurement,
    }
}

pub fn latency(results: &[TargetSamples]) -> Measurement {
    let mut targets = Map::new();
    let mut averages = Vec::new();

    for result in results {
        let replies = result.replies();
        let summary = summarize(&replies);
        if let Some(summary) = summary {
            averages.push(summary.avg);
        }
        targets.insert(
            result.target.label.clone(),
            json!({
                "address": result.target.address,
                "sent": result.samples.len(),
                "received": replies.len(),
                "min_ms": summary.map(|s| round2(s.min)),
                "max_ms": summary.map(|s| round2(s.max)),
                "avg_ms": summary.map(|s| round2(s.avg)),
            }),
        );
    }

    let Some(state) = mean(&averages) else {
        return no_reply(results).with("targets", Value::Object(targets));
    };

    let status = SensorStatus::from_counts(averages.len(), results.len());
    let error = failure_summary(results, |result| result.replies().is_empty());
    finish(Measurement::new(SensorValue::Number(round2(state)), status), error, targets)
}

pub fn packet_loss(results: &[TargetSamples]) -> Measurement {
    let mut targets = Map::new();
    let mut losses = Vec::with_capacity(results.len());

    for result in results {
        let loss = loss_pct(result);
        losses.push(loss);
        targets.insert(
            result.target.label.clone(),
            json!({
                "address": result.target.address,
                "sent": result.samples.len(),
                "lost": result.lost(),
                "loss_pct": round2(loss),
            }),
        );
    }

    let Some(state) = mean(&losses) else {
        return no_reply(results);
    };

    let answered = results.iter().filter(|result| !result.replies().is_empty()).count();
    let status = SensorStatus::from_counts(answered, results.len());
    let error = failure_summary(results, |result| result.replies().is_empty());
    let mut measurement = finish(Measurement::new(SensorValue::Number(round2(state)), status), error, targets);
    if status == SensorStatus::Error {
        let kind = results.iter().find_map(|result| result.error.as_ref()).map_or("timeout", |error| error.kind());
        measurement = measurement.with(super::ERROR_KIND_KEY, kind);
    }
    measurement
}

pub fn jitter(results: &[TargetSamples]) -> Measurement {
    let mut targets = Map::new();
    let mut jitters = Vec::new();

    for result in results {
        let replies = result.replies();
        let value = jitter_ms(&replies);
        if let Some(value) = value {
            jitters.push(value);
        }
        targets.insert(
            result.target.label.clone(),
            json!({
                "address": result.target.address,
                "received": replies.len(),
                "jitter_ms": value.map(round2),
            }),
        );
    }

    let Some(state) = mean(&jitters) else {
        return no_reply(results).with("targets", Value::Object(targets));
    };

    let status = SensorStatus::from_counts(jitters.len(), results.len());
    let error = failure_summary(results, |result| result.replies().len() < 2);
    finish(Measurement::new(SensorValue::Number(round2(state)), status), error, targets)
}
