use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::time::{format_time, Time};
use crate::{Error, Result};

/// A closed time range `[start, stop]`.
///
/// Two intervals that merely touch (one stops right when the other starts) don't overlap, so their
/// intersection is `None` and subtracting one from the other leaves it untouched. Fragments left by
/// `difference` share their boundary timestamps with the interval that was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    pub start: Time,
    pub stop: Time,
}

#[derive(Deserialize)]
struct RawInterval {
    start: Time,
    stop: Time,
}

impl TryFrom<RawInterval> for Interval {
    type Error = Error;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::new(raw.start, raw.stop)
    }
}

impl Interval {
    pub fn new(start: Time, stop: Time) -> Result<Self> {
        if start > stop {
            return Err(Error::invalid(format!(
                "Interval starts at {} after it stops at {}",
                format_time(start),
                format_time(stop)
            )));
        }
        Ok(Self { start, stop })
    }

    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }

    /// With `strict`, the boundaries themselves aren't contained.
    pub fn contains(&self, t: Time, strict: bool) -> bool {
        if strict {
            self.start < t && t < self.stop
        } else {
            self.start <= t && t <= self.stop
        }
    }

    /// True if the two intervals share more than a boundary point.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start.max(other.start) < self.stop.min(other.stop)
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        if start >= stop {
            return None;
        }
        Some(Interval { start, stop })
    }

    /// The smallest interval covering both, if they overlap or touch.
    pub fn union(&self, other: &Interval) -> Option<Interval> {
        if self.start.max(other.start) > self.stop.min(other.stop) {
            return None;
        }
        Some(Interval {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        })
    }

    /// What's left of `self` after removing `other`: zero, one or two fragments.
    pub fn difference(&self, other: &Interval) -> IntervalCollection {
        // Covered entirely
        if other.start <= self.start && other.stop >= self.stop {
            return IntervalCollection::default();
        }
        // Disjoint, or only touching
        if other.stop <= self.start || other.start >= self.stop {
            return IntervalCollection::from_sorted(vec![*self]);
        }
        let mut fragments = Vec::new();
        if other.start > self.start {
            fragments.push(Interval {
                start: self.start,
                stop: other.start,
            });
        }
        if other.stop < self.stop {
            fragments.push(Interval {
                start: other.stop,
                stop: self.stop,
            });
        }
        IntervalCollection::from_sorted(fragments)
    }

    /// Removes every interval of the collection from `self`.
    pub fn difference_all(&self, others: &IntervalCollection) -> IntervalCollection {
        let mut remaining = vec![*self];
        for other in others.iter() {
            remaining = remaining
                .into_iter()
                .flat_map(|piece| piece.difference(other).0)
                .collect();
            if remaining.is_empty() {
                break;
            }
        }
        IntervalCollection::from_sorted(remaining)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, {}]", format_time(self.start), format_time(self.stop))
    }
}

/// Sorted, non-overlapping intervals. Overlapping input is merged on construction; intervals
/// that only touch stay separate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Interval>")]
pub struct IntervalCollection(Vec<Interval>);

impl From<Vec<Interval>> for IntervalCollection {
    fn from(intervals: Vec<Interval>) -> Self {
        Self::new(intervals)
    }
}

impl IntervalCollection {
    pub fn new(mut intervals: Vec<Interval>) -> Self {
        intervals.sort();
        let mut merged: Vec<Interval> = Vec::new();
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if last.overlaps(&interval) => {
                    last.stop = last.stop.max(interval.stop);
                }
                _ => merged.push(interval),
            }
        }
        Self(merged)
    }

    // Callers guarantee the order and disjointness
    fn from_sorted(intervals: Vec<Interval>) -> Self {
        Self(intervals)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<Interval> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Interval> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Interval> {
        self.0.last()
    }

    /// The single interval spanning everything, if there's anything.
    pub fn span(&self) -> Option<Interval> {
        Some(Interval {
            start: self.first()?.start,
            stop: self.last()?.stop,
        })
    }

    /// Removes `target` from each interval, keeping the surviving fragments.
    pub fn difference(&self, target: &Interval) -> IntervalCollection {
        IntervalCollection::new(
            self.0
                .iter()
                .flat_map(|interval| interval.difference(target).0)
                .collect(),
        )
    }

    pub fn intersection(&self, target: &Interval) -> IntervalCollection {
        IntervalCollection::from_sorted(
            self.0
                .iter()
                .filter_map(|interval| interval.intersection(target))
                .collect(),
        )
    }

    pub fn total_duration(&self) -> Duration {
        self.0
            .iter()
            .fold(Duration::zero(), |acc, i| acc + i.duration())
    }
}

impl IntoIterator for IntervalCollection {
    type Item = Interval;
    type IntoIter = std::vec::IntoIter<Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a IntervalCollection {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Interval> for IntervalCollection {
    fn from(interval: Interval) -> Self {
        Self(vec![interval])
    }
}

impl FromIterator<Interval> for IntervalCollection {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Anything covering one or several time ranges: intervals, trajectories, sequences of segments.
pub trait TimeSpan {
    fn intervals(&self) -> IntervalCollection;
}

impl TimeSpan for Interval {
    fn intervals(&self) -> IntervalCollection {
        (*self).into()
    }
}

impl TimeSpan for IntervalCollection {
    fn intervals(&self) -> IntervalCollection {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn t(secs: i64) -> Time {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn i(start: i64, stop: i64) -> Interval {
        Interval::new(t(start), t(stop)).unwrap()
    }

    #[test]
    fn rejects_backwards() {
        assert!(Interval::new(t(10), t(0)).is_err());
        assert!(Interval::new(t(10), t(10)).is_ok());
    }

    #[test]
    fn deserializing_checks_order() {
        let json = serde_json::to_string(&i(0, 10)).unwrap();
        assert_eq!(serde_json::from_str::<Interval>(&json).unwrap(), i(0, 10));

        let backwards = format!(
            r#"{{"start": {:?}, "stop": {:?}}}"#,
            t(10).to_rfc3339(),
            t(0).to_rfc3339()
        );
        assert!(serde_json::from_str::<Interval>(&backwards).is_err());

        // Overlapping and unsorted input is merged, like IntervalCollection::new
        let messy = serde_json::to_string(&vec![i(20, 30), i(0, 10), i(5, 15)]).unwrap();
        let collection: IntervalCollection = serde_json::from_str(&messy).unwrap();
        assert_eq!(collection, IntervalCollection::new(vec![i(0, 15), i(20, 30)]));
    }

    #[test]
    fn intersection_excludes_touching() {
        assert_eq!(i(0, 10).intersection(&i(5, 20)), Some(i(5, 10)));
        assert_eq!(i(0, 10).intersection(&i(10, 20)), None);
        assert_eq!(i(0, 10).intersection(&i(20, 30)), None);
        assert_eq!(i(0, 10).intersection(&i(2, 3)), Some(i(2, 3)));
    }

    #[test]
    fn difference_cases() {
        // Covered
        assert!(i(5, 6).difference(&i(0, 10)).is_empty());
        // Disjoint and touching
        assert_eq!(i(0, 10).difference(&i(20, 30)), i(0, 10).intervals());
        assert_eq!(i(0, 10).difference(&i(10, 30)), i(0, 10).intervals());
        // Strictly inside
        assert_eq!(
            i(0, 60).difference(&i(20, 30)),
            IntervalCollection::new(vec![i(0, 20), i(30, 60)])
        );
        // One boundary
        assert_eq!(i(0, 60).difference(&i(50, 70)), i(0, 50).intervals());
        assert_eq!(i(0, 60).difference(&i(-5, 10)), i(10, 60).intervals());
    }

    #[test]
    fn difference_all() {
        let holes = IntervalCollection::new(vec![i(40, 50), i(10, 20)]);
        assert_eq!(
            i(0, 60).difference_all(&holes),
            IntervalCollection::new(vec![i(0, 10), i(20, 40), i(50, 60)])
        );
        assert!(i(0, 60)
            .difference_all(&IntervalCollection::new(vec![i(-10, 70)]))
            .is_empty());
        assert_eq!(
            i(0, 60).difference_all(&IntervalCollection::default()),
            i(0, 60).intervals()
        );
    }

    #[test]
    fn collection_merges_and_subtracts() {
        let c = IntervalCollection::new(vec![i(30, 40), i(0, 10), i(5, 15), i(15, 20)]);
        // 0-10 and 5-15 merge, 15-20 only touches
        assert_eq!(c.len(), 3);
        assert_eq!(c.span(), Some(i(0, 40)));

        let left = c.difference(&i(8, 35));
        assert_eq!(left, IntervalCollection::new(vec![i(0, 8), i(35, 40)]));
        assert_eq!(c.intersection(&i(8, 35)).len(), 3);
    }

    proptest! {
        #[test]
        fn difference_and_intersection_rebuild(
            a0 in -1000i64..1000, a_len in 1i64..500,
            b0 in -1000i64..1000, b_len in 0i64..500,
        ) {
            let a = i(a0, a0 + a_len);
            let b = i(b0, b0 + b_len);

            let mut pieces: Vec<Interval> = a.difference(&b).into_iter().collect();
            if let Some(overlap) = a.intersection(&b) {
                pieces.push(overlap);
            }
            pieces.sort();

            prop_assert!(!pieces.is_empty());
            prop_assert_eq!(pieces[0].start, a.start);
            prop_assert_eq!(pieces.last().unwrap().stop, a.stop);
            for pair in pieces.windows(2) {
                // No gaps, and no overlap beyond the shared boundary
                prop_assert_eq!(pair[0].stop, pair[1].start);
            }
        }
    }
}
