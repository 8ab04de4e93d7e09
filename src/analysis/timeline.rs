use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DataSnapshot;

/// How several values reported for one quantity within a time step combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accumulation {
    /// Keep the first value of the step
    #[default]
    First,
    /// Keep the last value of the step
    Last,
    Sum,
    Min,
    Max,
    /// Arithmetic mean of all values of the step
    Average,
}

impl Accumulation {
    /// Combine the current value with a new one; `count` includes the new value
    fn combine(self, current: f64, value: f64, count: usize) -> f64 {
        match self {
            Accumulation::First => current,
            Accumulation::Last => value,
            Accumulation::Sum => current + value,
            Accumulation::Min => current.min(value),
            Accumulation::Max => current.max(value),
            Accumulation::Average => current + (value - current) / count as f64,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Series {
    accumulation: Accumulation,
    points: Vec<(f64, f64)>,
    /// Values folded into the last point
    last_count: usize,
}

/// Time series of the quantities one analyzer extracts
#[derive(Debug, Clone, Default)]
pub struct TimeLines {
    time: Option<f64>,
    series: BTreeMap<String, Series>,
}

impl TimeLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time new values are recorded at
    pub fn set_time(&mut self, time: f64) {
        self.time = Some(time);
    }

    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Choose the accumulation of a quantity; existing points are kept
    pub fn set_accumulation(&mut self, name: &str, accumulation: Accumulation) {
        self.series.entry(name.to_string()).or_default().accumulation = accumulation;
    }

    /// Record a value at the current time
    ///
    /// Returns `false` when no time is known yet; the value is dropped then.
    pub fn set_value(&mut self, name: &str, value: f64) -> bool {
        let Some(time) = self.time else {
            return false;
        };

        let series = self.series.entry(name.to_string()).or_default();
        match series.points.last_mut() {
            Some((t, current)) if *t == time => {
                series.last_count += 1;
                *current = series.accumulation.combine(*current, value, series.last_count);
            }
            _ => {
                series.points.push((time, value));
                series.last_count = 1;
            }
        }
        true
    }

    /// Record a value with an accumulation that applies if the quantity is new
    pub fn set_value_with(&mut self, name: &str, value: f64, accumulation: Accumulation) -> bool {
        if !self.series.contains_key(name) {
            self.set_accumulation(name, accumulation);
        }
        self.set_value(name, value)
    }

    /// All points of a quantity in time order
    pub fn values(&self, name: &str) -> Option<&[(f64, f64)]> {
        self.series.get(name).map(|s| s.points.as_slice())
    }

    /// Most recent value of a quantity
    pub fn last(&self, name: &str) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|s| s.points.last())
            .map(|(_, v)| *v)
    }

    /// Names of all quantities with at least one point
    pub fn quantities(&self) -> impl Iterator<Item = &str> {
        self.series
            .iter()
            .filter(|(_, s)| !s.points.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Most recent value of every quantity
    pub fn latest(&self) -> DataSnapshot {
        self.series
            .iter()
            .filter_map(|(name, s)| s.points.last().map(|(_, v)| (name.clone(), *v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|s| s.points.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_before_time_are_dropped() {
        let mut lines = TimeLines::new();
        assert!(!lines.set_value("p", 1.0));
        assert!(lines.is_empty());

        lines.set_time(0.1);
        assert!(lines.set_value("p", 2.0));
        assert_eq!(lines.values("p"), Some(&[(0.1, 2.0)][..]));
    }

    #[test]
    fn test_accumulations_within_step() {
        let mut lines = TimeLines::new();
        lines.set_time(1.0);
        for (name, acc) in [
            ("first", Accumulation::First),
            ("last", Accumulation::Last),
            ("sum", Accumulation::Sum),
            ("min", Accumulation::Min),
            ("max", Accumulation::Max),
            ("avg", Accumulation::Average),
        ] {
            for v in [3.0, 1.0, 5.0] {
                lines.set_value_with(name, v, acc);
            }
        }

        assert_eq!(lines.last("first"), Some(3.0));
        assert_eq!(lines.last("last"), Some(5.0));
        assert_eq!(lines.last("sum"), Some(9.0));
        assert_eq!(lines.last("min"), Some(1.0));
        assert_eq!(lines.last("max"), Some(5.0));
        assert_eq!(lines.last("avg"), Some(3.0));
    }

    #[test]
    fn test_new_step_starts_new_point() {
        let mut lines = TimeLines::new();
        lines.set_time(1.0);
        lines.set_value_with("it", 2.0, Accumulation::Sum);
        lines.set_value_with("it", 3.0, Accumulation::Sum);
        lines.set_time(2.0);
        lines.set_value("it", 4.0);

        assert_eq!(lines.values("it"), Some(&[(1.0, 5.0), (2.0, 4.0)][..]));
        assert_eq!(lines.latest().get("it"), Some(&4.0));
    }
}
