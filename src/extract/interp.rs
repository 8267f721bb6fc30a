//! Temporal lookups on a single file's time axis.

use chrono::{Duration, NaiveDateTime};

/// How values are taken from a file's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// Linear between the neighbouring steps, clamped to the edge values.
    #[default]
    Interpolate,
    /// Value of the nearest step, for invariant fields.
    Nearest,
}

/// Whether `t` lies in `[first - tolerance, last + tolerance)`.
pub fn covers(times: &[NaiveDateTime], t: NaiveDateTime, tolerance: Duration) -> bool {
    match (times.first(), times.last()) {
        (Some(first), Some(last)) => *first - tolerance <= t && t < *last + tolerance,
        _ => false,
    }
}

/// Linear interpolation of `values` at `t`. Outside the axis the edge value is returned.
pub fn interpolate_at(times: &[NaiveDateTime], values: &[f64], t: NaiveDateTime) -> f64 {
    if times.is_empty() || values.len() != times.len() {
        return f64::NAN;
    }
    let upper = times.partition_point(|x| *x <= t);
    if upper == 0 {
        return values[0];
    }
    if upper == times.len() {
        return values[times.len() - 1];
    }
    let lower = upper - 1;
    if times[lower] == t {
        return values[lower];
    }
    let span = (times[upper] - times[lower]).num_milliseconds() as f64;
    let offset = (t - times[lower]).num_milliseconds() as f64;
    let weight = offset / span;
    values[lower] + weight * (values[upper] - values[lower])
}

/// Index of the step closest to `t`; ties go to the earlier step.
pub fn nearest_index(times: &[NaiveDateTime], t: NaiveDateTime) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .min_by_key(|(_, x)| (**x - t).num_milliseconds().abs())
        .map(|(i, _)| i)
}

pub fn lookup(mode: LookupMode, times: &[NaiveDateTime], values: &[f64], t: NaiveDateTime) -> f64 {
    match mode {
        LookupMode::Interpolate => interpolate_at(times, values, t),
        LookupMode::Nearest => nearest_index(times, t)
            .and_then(|i| values.get(i).copied())
            .unwrap_or(f64::NAN),
    }
}
