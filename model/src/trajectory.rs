use std::collections::BTreeSet;
use std::ops::{Add, BitAnd, Sub};

use chrono::Duration;

use crate::interval::{Interval, IntervalCollection, TimeSpan};
use crate::segments::Segments;
use crate::table::{Column, DType, Row, Table, Value};
use crate::time::{format_time, lerp, saturating_add, saturating_sub, Time};
use crate::traffic::Traffic;
use crate::{Error, Result};

pub const TIMESTAMP: &str = "timestamp";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// One vehicle's positional history: a non-empty table with at least a `timestamp`, `latitude` and
/// `longitude` column.
///
/// Rows are kept in the order they were given. Temporal operations assume they're sorted; call
/// `sort_by_time` first when unsure. Nothing ever modifies a trajectory in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    data: Table,
    // Cached from the timestamp column, which can't hold nulls
    times: Vec<Time>,
    start: Time,
    stop: Time,
}

/// The result of asking for the one value a column should hold.
#[derive(Clone, Debug, PartialEq)]
pub enum Unique {
    /// Only nulls
    None,
    One(Value),
    /// Ambiguous. The trajectory probably needs to be split.
    Many(Vec<Value>),
}

impl Unique {
    pub fn one(self) -> Option<Value> {
        match self {
            Unique::One(value) => Some(value),
            _ => None,
        }
    }

    /// Flattens to a single value. Several values become a text set like `{a, b}`.
    pub fn into_value(self) -> Value {
        match self {
            Unique::None => Value::Null,
            Unique::One(value) => value,
            Unique::Many(values) => {
                let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                Value::Text(format!("{{{}}}", list.join(", ")))
            }
        }
    }
}

/// One sample, as returned by `at`.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub timestamp: Time,
    values: Vec<(String, Value)>,
}

impl Position {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.get(LATITUDE)?.as_f64()
    }

    pub fn longitude(&self) -> Option<f64> {
        self.get(LONGITUDE)?.as_f64()
    }

    pub fn altitude(&self) -> Option<f64> {
        self.get("altitude")?.as_f64()
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// One side of a time slice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeBound {
    /// Unbounded
    Open,
    At(Time),
    /// As a start, relative to the trajectory's start. As a stop, relative to the resolved start.
    Offset(Duration),
}

impl From<Time> for TimeBound {
    fn from(t: Time) -> Self {
        TimeBound::At(t)
    }
}

impl From<Duration> for TimeBound {
    fn from(d: Duration) -> Self {
        TimeBound::Offset(d)
    }
}

impl From<Option<Time>> for TimeBound {
    fn from(t: Option<Time>) -> Self {
        t.map(TimeBound::At).unwrap_or(TimeBound::Open)
    }
}

impl Trajectory {
    pub fn new(data: Table) -> Result<Self> {
        let times = match data.column(TIMESTAMP) {
            Some(Column::Time(values)) => {
                let mut times = Vec::with_capacity(values.len());
                for (idx, t) in values.iter().enumerate() {
                    match t {
                        Some(t) => times.push(*t),
                        None => {
                            return Err(Error::invalid(format!("Row {idx} has no timestamp")));
                        }
                    }
                }
                times
            }
            Some(_) => {
                return Err(Error::TypeMismatch {
                    column: TIMESTAMP.to_string(),
                    expected: "timestamp".to_string(),
                })
            }
            None => return Err(Error::missing(TIMESTAMP, "Every sample needs a time.")),
        };
        if times.is_empty() {
            return Err(Error::invalid("A trajectory needs at least one sample"));
        }

        let mut data = data;
        for name in [LATITUDE, LONGITUDE] {
            let column = data
                .column(name)
                .ok_or_else(|| Error::missing(name, "Every sample needs a position."))?;
            if !column.is_numeric() {
                let cast = column
                    .cast(DType::Float)
                    .ok_or_else(|| Error::TypeMismatch {
                        column: name.to_string(),
                        expected: "float".to_string(),
                    })?;
                data = data.with_column(name, cast)?;
            }
        }

        // times is non-empty
        let mut start = times[0];
        let mut stop = times[0];
        for t in &times {
            start = start.min(*t);
            stop = stop.max(*t);
        }
        Ok(Self {
            data,
            times,
            start,
            stop,
        })
    }

    /// A bare trajectory from `(time, latitude, longitude)` samples.
    pub fn from_points(points: &[(Time, f64, f64)]) -> Result<Self> {
        Self::new(Table::new(vec![
            (
                TIMESTAMP.to_string(),
                Column::Time(points.iter().map(|(t, _, _)| Some(*t)).collect()),
            ),
            (
                LATITUDE.to_string(),
                Column::floats(points.iter().map(|(_, lat, _)| *lat).collect()),
            ),
            (
                LONGITUDE.to_string(),
                Column::floats(points.iter().map(|(_, _, lon)| *lon).collect()),
            ),
        ])?)
    }

    pub fn data(&self) -> &Table {
        &self.data
    }

    pub fn into_data(self) -> Table {
        self.data
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn stop(&self) -> Time {
        self.stop
    }

    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            stop: self.stop,
        }
    }

    /// Number of samples. When the data records which samples were only repeating the last known
    /// position, each distinct `last_position` counts once.
    pub fn len(&self) -> usize {
        match self.data.column("last_position") {
            Some(column) => column
                .values()
                .iter()
                .map(Value::key)
                .collect::<BTreeSet<_>>()
                .len(),
            None => self.data.len(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.data.has(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.data
            .column(name)
            .ok_or_else(|| Error::missing(name, "The trajectory doesn't have it."))
    }

    /// Numeric values of a column, or an error if it's absent or not numeric.
    pub fn floats(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.column(name)?
            .to_f64()
            .ok_or_else(|| Error::TypeMismatch {
                column: name.to_string(),
                expected: "numeric".to_string(),
            })
    }

    /// The single non-null value a column holds. Logs a warning when there's more than one.
    pub fn unique(&self, name: &str) -> Unique {
        let Some(column) = self.data.column(name) else {
            return Unique::None;
        };
        let mut seen = BTreeSet::new();
        let mut distinct: Vec<Value> = Vec::new();
        for idx in 0..column.len() {
            if column.is_null(idx) {
                continue;
            }
            let value = column.get(idx);
            if seen.insert(value.key()) {
                distinct.push(value);
            }
        }
        match distinct.len() {
            0 => Unique::None,
            1 => Unique::One(distinct.remove(0)),
            _ => {
                warn!(
                    "Several values for {name} between {} and {}: {:?}",
                    format_time(self.start),
                    format_time(self.stop),
                    distinct
                );
                Unique::Many(distinct)
            }
        }
    }

    /// A derived property (`start`, `stop`, `duration`, `len`) or the unique value of a column.
    pub fn property(&self, name: &str) -> Result<Value> {
        Ok(match name {
            "start" => self.start.into(),
            "stop" => self.stop.into(),
            "duration" => self.duration().into(),
            "len" => self.len().into(),
            _ => {
                if !self.has(name) {
                    return Err(Error::missing(
                        name,
                        "It's neither a derived property nor a column.",
                    ));
                }
                self.unique(name).into_value()
            }
        })
    }

    /// A new trajectory over another table, such as a transformed copy of this one's.
    pub fn with_data(&self, data: Table) -> Result<Self> {
        Self::new(data)
    }

    /// Adds or replaces a column.
    pub fn assign(&self, name: &str, column: Column) -> Result<Self> {
        if name == TIMESTAMP {
            return Self::new(self.data.with_column(name, column)?);
        }
        let data = self.data.with_column(name, column)?;
        // Timestamps are unchanged
        Ok(Self {
            data,
            times: self.times.clone(),
            start: self.start,
            stop: self.stop,
        })
    }

    /// Adds a column holding the same value on every row.
    pub fn assign_value(&self, name: &str, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let values = vec![value; self.data.len()];
        self.assign(name, Column::from_values(&values))
    }

    pub fn drop_columns(&self, names: &[&str]) -> Result<Self> {
        Self::new(self.data.without(names))
    }

    pub(crate) fn take(&self, indices: &[usize]) -> Option<Self> {
        if indices.is_empty() {
            return None;
        }
        let times: Vec<Time> = indices.iter().map(|i| self.times[*i]).collect();
        let mut start = times[0];
        let mut stop = times[0];
        for t in &times {
            start = start.min(*t);
            stop = stop.max(*t);
        }
        Some(Self {
            data: self.data.take(indices),
            times,
            start,
            stop,
        })
    }

    /// Keeps the rows where the mask is true, or `None` if there are none.
    pub fn filter(&self, mask: &[bool]) -> Option<Self> {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect();
        self.take(&indices)
    }

    /// Keeps the rows matching a predicate, or `None` if there are none.
    pub fn query(&self, predicate: impl Fn(&Row<'_>) -> bool) -> Option<Self> {
        let mask: Vec<bool> = self.data.rows().map(|row| predicate(&row)).collect();
        self.filter(&mask)
    }

    pub fn sort_by_time(&self) -> Self {
        let mut indices: Vec<usize> = (0..self.times.len()).collect();
        // Stable, so samples sharing a timestamp keep their order
        indices.sort_by_key(|i| self.times[*i]);
        match self.take(&indices) {
            Some(sorted) => sorted,
            None => self.clone(),
        }
    }

    /// Stacks trajectories, in the order given.
    pub fn concat(pieces: &[&Trajectory]) -> Result<Self> {
        let tables: Vec<&Table> = pieces.iter().map(|t| &t.data).collect();
        Self::new(Table::concat(&tables)?)
    }

    pub fn pipe<T>(&self, f: impl FnOnce(&Trajectory) -> T) -> T {
        f(self)
    }

    /// The rows with timestamps between `start` and `stop`. With `strict`, rows exactly on a
    /// boundary are excluded. `None` if nothing's left.
    pub fn slice_between(
        &self,
        start: impl Into<TimeBound>,
        stop: impl Into<TimeBound>,
        strict: bool,
    ) -> Option<Self> {
        let start = match start.into() {
            TimeBound::Open => None,
            TimeBound::At(t) => Some(t),
            TimeBound::Offset(d) => Some(saturating_add(self.start, d)),
        };
        let stop = match stop.into() {
            TimeBound::Open => None,
            TimeBound::At(t) => Some(t),
            TimeBound::Offset(d) => Some(saturating_add(start.unwrap_or(self.start), d)),
        };
        let mask: Vec<bool> = self
            .times
            .iter()
            .map(|t| {
                let after_start = match start {
                    None => true,
                    Some(s) if strict => *t > s,
                    Some(s) => *t >= s,
                };
                let before_stop = match stop {
                    None => true,
                    Some(s) if strict => *t < s,
                    Some(s) => *t <= s,
                };
                after_start && before_stop
            })
            .collect();
        self.filter(&mask)
    }

    /// From the trajectory's own start up to `t`.
    pub fn before(&self, t: Time, strict: bool) -> Option<Self> {
        self.slice_between(self.start, t, strict)
    }

    /// From `t` up to the trajectory's own stop.
    pub fn after(&self, t: Time, strict: bool) -> Option<Self> {
        self.slice_between(t, self.stop, strict)
    }

    /// The samples strictly less than `duration` after the start.
    pub fn first(&self, duration: Duration) -> Option<Self> {
        let cutoff = saturating_add(self.start, duration);
        self.filter(&self.times.iter().map(|t| *t < cutoff).collect::<Vec<_>>())
    }

    /// The samples strictly less than `duration` before the stop.
    pub fn last(&self, duration: Duration) -> Option<Self> {
        let cutoff = saturating_sub(self.stop, duration);
        self.filter(&self.times.iter().map(|t| *t > cutoff).collect::<Vec<_>>())
    }

    /// Drops the leading `duration`.
    pub fn skip(&self, duration: Duration) -> Option<Self> {
        let cutoff = saturating_add(self.start, duration);
        self.filter(&self.times.iter().map(|t| *t >= cutoff).collect::<Vec<_>>())
    }

    /// Drops the trailing `duration`.
    pub fn shorten(&self, duration: Duration) -> Option<Self> {
        let cutoff = saturating_sub(self.stop, duration);
        self.filter(&self.times.iter().map(|t| *t <= cutoff).collect::<Vec<_>>())
    }

    /// Slices by an interval.
    pub fn slice(&self, interval: &Interval, strict: bool) -> Option<Self> {
        self.slice_between(interval.start, interval.stop, strict)
    }

    /// One sub-trajectory per interval, boundaries included. Intervals covering no sample are
    /// skipped.
    pub fn slices(&self, intervals: &IntervalCollection) -> Segments {
        let trajectory = self.clone();
        let intervals = intervals.clone();
        Segments::new("slices", move || {
            let trajectory = trajectory.clone();
            intervals
                .clone()
                .into_iter()
                .filter_map(move |interval| trajectory.slice(&interval, false))
        })
    }

    pub(crate) fn position(&self, idx: usize) -> Position {
        Position {
            timestamp: self.times[idx],
            values: self
                .data
                .columns()
                .iter()
                .map(|(name, column)| (name.clone(), column.get(idx)))
                .collect(),
        }
    }

    /// The sample at exactly `t`, or with no time, the last sample with every column forward
    /// filled.
    pub fn at(&self, t: impl Into<Option<Time>>) -> Option<Position> {
        match t.into() {
            Some(t) => {
                let Some(idx) = self.times.iter().position(|x| *x == t) else {
                    warn!(
                        "{} not sampled at {}",
                        self.title(),
                        format_time(t)
                    );
                    return None;
                };
                Some(self.position(idx))
            }
            None => {
                let last = self.times.len() - 1;
                let values = self
                    .data
                    .columns()
                    .iter()
                    .map(|(name, column)| {
                        let value = (0..column.len())
                            .rev()
                            .find(|i| !column.is_null(*i))
                            .map(|i| column.get(i))
                            .unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect();
                Some(Position {
                    timestamp: self.times[last],
                    values,
                })
            }
        }
    }

    /// `at(start + ratio * duration)`
    pub fn at_ratio(&self, ratio: f64) -> Result<Option<Position>> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::invalid(format!(
                "ratio must be between 0 and 1, not {ratio}"
            )));
        }
        Ok(self.at(lerp(self.start, self.stop, ratio)))
    }
}

impl TimeSpan for Trajectory {
    fn intervals(&self) -> IntervalCollection {
        self.interval().into()
    }
}

impl Add for Trajectory {
    type Output = Traffic;

    fn add(self, other: Trajectory) -> Traffic {
        Traffic::new(vec![self, other])
    }
}

impl Add<Traffic> for Trajectory {
    type Output = Traffic;

    fn add(self, other: Traffic) -> Traffic {
        let mut all = vec![self];
        all.extend(other);
        Traffic::new(all)
    }
}

/// Whatever remains of the trajectory once the other time spans are removed. Remaining pieces
/// share their boundary samples with the removed spans.
impl<T: TimeSpan> Sub<&T> for &Trajectory {
    type Output = Segments;

    fn sub(self, other: &T) -> Segments {
        let remaining = self.interval().difference_all(&other.intervals());
        self.slices(&remaining).named("difference")
    }
}

/// The part of `self` overlapping `other` in time.
impl BitAnd for &Trajectory {
    type Output = Option<Trajectory>;

    fn bitand(self, other: &Trajectory) -> Option<Trajectory> {
        let overlap = self.interval().intersection(&other.interval())?;
        self.slice(&overlap, false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    pub fn t(secs: i64) -> Time {
        Utc.with_ymd_and_hms(2022, 2, 22, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// A sample every `secs[i]` seconds after noon, flying east along the equator.
    pub fn flight(secs: &[i64]) -> Trajectory {
        let points: Vec<(Time, f64, f64)> = secs
            .iter()
            .enumerate()
            .map(|(idx, s)| (t(*s), 0.0, idx as f64 * 0.01))
            .collect();
        Trajectory::from_points(&points).unwrap()
    }

    #[test]
    fn validation() {
        assert!(Trajectory::from_points(&[]).is_err());
        let data = Table::new(vec![(
            TIMESTAMP.to_string(),
            Column::Time(vec![Some(t(0))]),
        )])
        .unwrap();
        assert!(matches!(
            Trajectory::new(data),
            Err(Error::MissingColumn { .. })
        ));
    }

    #[test]
    fn slice_boundaries() {
        let f = flight(&[0, 5, 10]);
        let strict = f.slice_between(t(0), t(10), true).unwrap();
        assert_eq!(strict.times(), &[t(5)]);
        let inclusive = f.slice_between(t(0), t(10), false).unwrap();
        assert_eq!(inclusive.data().len(), 3);
        assert!(f.slice_between(t(1), t(4), false).is_none());

        // Open bounds and offsets
        assert_eq!(
            f.slice_between(TimeBound::Open, t(5), false).unwrap().times(),
            &[t(0), t(5)]
        );
        assert_eq!(
            f.slice_between(Duration::seconds(5), Duration::seconds(5), false)
                .unwrap()
                .times(),
            &[t(5), t(10)]
        );
        assert_eq!(f.before(t(10), true).unwrap().times(), &[t(5)]);
        assert_eq!(f.after(t(0), false).unwrap().data().len(), 3);
    }

    #[test]
    fn first_last_skip_shorten() {
        let f = flight(&[0, 5, 10, 15]);
        assert_eq!(f.first(Duration::seconds(5)).unwrap().times(), &[t(0)]);
        assert_eq!(f.last(Duration::seconds(6)).unwrap().times(), &[t(10), t(15)]);
        assert_eq!(f.skip(Duration::seconds(5)).unwrap().times(), &[t(5), t(10), t(15)]);
        assert_eq!(f.shorten(Duration::seconds(5)).unwrap().times(), &[t(0), t(5), t(10)]);
        assert!(f.skip(Duration::minutes(1)).is_none());
        assert!(f.shorten(Duration::minutes(1)).is_none());
    }

    #[test]
    fn durations_past_the_calendar() {
        let f = flight(&[0, 5, 10, 15]);
        let forever = crate::time::parse_duration("100000000 days").unwrap();
        assert_eq!(f.first(forever).unwrap(), f);
        assert_eq!(f.last(forever).unwrap(), f);
        assert!(f.skip(forever).is_none());
        assert!(f.shorten(forever).is_none());
        assert!(f.first(-forever).is_none());
        assert!(f.slice_between(forever, TimeBound::Open, false).is_none());
        assert_eq!(
            f.slice_between(Duration::seconds(5), forever, false).unwrap().times(),
            &[t(5), t(10), t(15)]
        );
    }

    #[test]
    fn at_and_ratio() {
        let f = flight(&[0, 5, 10])
            .assign(
                "altitude",
                Column::Float(vec![Some(1000.0), Some(2000.0), None]),
            )
            .unwrap();
        assert_eq!(f.at(t(5)).unwrap().altitude(), Some(2000.0));
        assert!(f.at(t(6)).is_none());
        // Forward filled
        let last = f.at(None).unwrap();
        assert_eq!(last.timestamp, t(10));
        assert_eq!(last.altitude(), Some(2000.0));

        assert_eq!(f.at_ratio(0.5).unwrap().unwrap().timestamp, t(5));
        assert!(f.at_ratio(1.5).is_err());
        assert!(f.at_ratio(-0.1).is_err());
    }

    #[test]
    fn unique_values() {
        let f = flight(&[0, 1, 2]);
        let f = f
            .assign(
                "callsign",
                Column::Text(vec![Some("AFR12".into()), None, Some("AFR12".into())]),
            )
            .unwrap()
            .assign(
                "squawk",
                Column::Text(vec![Some("1000".into()), Some("7700".into()), None]),
            )
            .unwrap();
        assert_eq!(f.unique("callsign"), Unique::One("AFR12".into()));
        assert!(matches!(f.unique("squawk"), Unique::Many(v) if v.len() == 2));
        assert_eq!(f.unique("nope"), Unique::None);
        assert_eq!(f.property("duration").unwrap(), Value::Duration(Duration::seconds(2)));
        assert!(f.property("nope").is_err());
    }

    #[test]
    fn operators() {
        let f = flight(&(0..=60).map(|m| m * 60).collect::<Vec<_>>());
        let middle = f.slice_between(t(20 * 60), t(30 * 60), false).unwrap();

        let rest: Vec<Trajectory> = (&f - &middle).iter().collect();
        assert_eq!(rest.len(), 2);
        assert_eq!((rest[0].start(), rest[0].stop()), (t(0), t(20 * 60)));
        assert_eq!((rest[1].start(), rest[1].stop()), (t(30 * 60), t(60 * 60)));

        let overlap = (&f & &middle).unwrap();
        assert_eq!(overlap.interval(), middle.interval());
        let later = flight(&[4000, 5000]);
        assert!((&f & &later).is_none());

        assert_eq!((f.clone() + later).len(), 2);
    }

    #[test]
    fn last_position_counts_once() {
        let f = flight(&[0, 1, 2, 3])
            .assign(
                "last_position",
                Column::Time(vec![Some(t(0)), Some(t(0)), Some(t(2)), Some(t(2))]),
            )
            .unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.data().len(), 4);

        // A long flight, reporting a new position every fourth sample
        let secs: Vec<i64> = (0..20_000).collect();
        let positions = secs.iter().map(|s| Some(t(s - s % 4))).collect();
        let long = flight(&secs)
            .assign("last_position", Column::Time(positions))
            .unwrap();
        assert_eq!(long.len(), 5_000);
    }
}
