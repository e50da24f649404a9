use std::ops::Range;
use std::rc::Rc;
use std::str::FromStr;

use chrono::Duration;

use crate::segments::Segments;
use crate::time::{duration_from_unit, format_duration, parse_duration, saturating_add, Time};
use crate::trajectory::Trajectory;
use crate::{Error, Result};

/// The largest time between consecutive samples of one segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gap(pub Duration);

impl Gap {
    /// Like `Gap::from_unit(10, "m")`
    pub fn from_unit(value: i64, unit: &str) -> Result<Self> {
        Ok(Self(duration_from_unit(value, unit)?))
    }
}

impl Default for Gap {
    fn default() -> Self {
        Self(Duration::minutes(10))
    }
}

impl From<Duration> for Gap {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl FromStr for Gap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(parse_duration(s)?))
    }
}

impl std::fmt::Display for Gap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", format_duration(self.0))
    }
}

/// Cuts the rows wherever consecutive timestamps are more than `gap` apart, always at the largest
/// remaining gap first. The ranges come back in order and cover every row exactly once.
fn split_ranges(times: &[Time], gap: Duration) -> Vec<Range<usize>> {
    if times.len() < 2 {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut stack = vec![0..times.len()];
    while let Some(range) = stack.pop() {
        // The first of the largest gaps
        let mut widest: Option<(usize, Duration)> = None;
        for idx in range.start + 1..range.end {
            let delta = times[idx] - times[idx - 1];
            if widest.map_or(true, |(_, d)| delta > d) {
                widest = Some((idx, delta));
            }
        }
        match widest {
            Some((idx, delta)) if delta > gap => {
                // Left piece is popped first
                stack.push(idx..range.end);
                stack.push(range.start..idx);
            }
            _ => result.push(range),
        }
    }
    result
}

impl Trajectory {
    /// Splits wherever samples are more than `gap` apart. Fewer than two samples produce nothing.
    ///
    /// A segment can hold a single sample when it's isolated by gaps on both sides; this way the
    /// segments always add up to the whole trajectory.
    pub fn split(&self, gap: impl Into<Gap>) -> Segments {
        let gap = gap.into();
        let trajectory = self.clone();
        Segments::new(format!("split({gap})"), move || {
            let trajectory = trajectory.clone();
            split_ranges(trajectory.times(), gap.0)
                .into_iter()
                .filter_map(move |range| trajectory.take(&range.collect::<Vec<_>>()))
        })
    }

    /// Like `split`, but two consecutive pieces are only split apart if `condition(before, after)`
    /// holds. Otherwise they're merged back together.
    pub fn split_with<F>(&self, gap: impl Into<Gap>, condition: F) -> Segments
    where
        F: Fn(&Trajectory, &Trajectory) -> bool + 'static,
    {
        let gap = gap.into();
        let trajectory = self.clone();
        let condition = Rc::new(condition);
        Segments::new(format!("split({gap}, condition)"), move || {
            let mut merged: Vec<Range<usize>> = Vec::new();
            for range in split_ranges(trajectory.times(), gap.0) {
                let split_here = match merged.last() {
                    None => true,
                    Some(previous) => {
                        let before = trajectory.take(&previous.clone().collect::<Vec<_>>());
                        let after = trajectory.take(&range.clone().collect::<Vec<_>>());
                        match (before, after) {
                            (Some(before), Some(after)) => condition(&before, &after),
                            _ => true,
                        }
                    }
                };
                match merged.last_mut() {
                    // The ranges are adjacent
                    Some(previous) if !split_here => previous.end = range.end,
                    _ => merged.push(range),
                }
            }
            let trajectory = trajectory.clone();
            merged
                .into_iter()
                .filter_map(move |range| trajectory.take(&range.collect::<Vec<_>>()))
        })
    }

    /// The longest segment `split` produces.
    pub fn max_split(&self, gap: impl Into<Gap>) -> Option<Trajectory> {
        self.split(gap).max_by_key(|segment| segment.duration())
    }

    /// `first(duration)`, then the same on everything strictly after `start + step`, and so on.
    pub fn sliding_windows(&self, duration: Duration, step: Duration) -> Result<Segments> {
        if duration <= Duration::zero() || step <= Duration::zero() {
            return Err(Error::invalid(format!(
                "sliding windows need a positive duration and step, not {} and {}",
                format_duration(duration),
                format_duration(step)
            )));
        }
        let trajectory = self.clone();
        Ok(Segments::new(
            format!(
                "sliding_windows({}, {})",
                format_duration(duration),
                format_duration(step)
            ),
            move || {
                std::iter::successors(Some(trajectory.clone()), move |rest| {
                    rest.after(saturating_add(rest.start(), step), true)
                })
                .map_while(move |rest| rest.first(duration))
            },
        ))
    }

    /// Episodes squawking 7700, split when they're more than 10 minutes apart.
    pub fn emergency(&self) -> Segments {
        let squawking = self.has("squawk").then(|| {
            self.query(|row| {
                row.text("squawk") == Some("7700")
                    || row.f64("squawk").map_or(false, |x| x == 7700.0)
            })
        });
        match squawking.flatten() {
            Some(squawking) => squawking.split(Gap::default()).named("emergency"),
            None => Segments::empty().named("emergency"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::table::Column;
    use crate::trajectory::tests::{flight, t};

    /// Sample times starting at 0, `steps` apart.
    fn times_from_steps(steps: &[i64]) -> Vec<i64> {
        std::iter::once(0)
            .chain(steps.iter().scan(0, |acc, step| {
                *acc += step;
                Some(*acc)
            }))
            .collect()
    }

    proptest! {
        #[test]
        fn segments_rebuild_the_trajectory(
            steps in prop::collection::vec(1i64..1500, 1..60),
            gap in 1i64..1200,
        ) {
            let secs = times_from_steps(&steps);
            let f = flight(&secs);
            let segments = f.split(Duration::seconds(gap));

            let all = segments.all(None).unwrap().unwrap();
            prop_assert_eq!(all.times(), f.times());
            prop_assert_eq!(all.floats("longitude").unwrap(), f.floats("longitude").unwrap());

            // One cut per gap wider than the threshold, and none inside a segment
            let wide = secs.windows(2).filter(|pair| pair[1] - pair[0] > gap).count();
            prop_assert_eq!(segments.count(), wide + 1);
            for segment in segments.iter() {
                for pair in segment.times().windows(2) {
                    prop_assert!(pair[1] - pair[0] <= Duration::seconds(gap));
                }
            }
        }
    }

    #[test]
    fn ten_minute_gap() {
        let f = flight(&[0, 1, 2, 10 * 60 + 3, 10 * 60 + 4]);
        let gap: Gap = "10 min".parse().unwrap();
        let sizes: Vec<usize> = f.split(gap).iter().map(|s| s.data().len()).collect();
        assert_eq!(sizes, vec![3, 2]);
        // Exactly the gap doesn't split
        let f = flight(&[0, 600]);
        assert_eq!(f.split(gap).count(), 1);
        assert_eq!(Gap::from_unit(10, "m").unwrap(), gap);
    }

    #[test]
    fn largest_gap_first() {
        let f = flight(&[0, 100, 130, 400, 410, 2000]);
        let segments: Vec<Vec<Time>> = f
            .split(Duration::seconds(60))
            .iter()
            .map(|s| s.times().to_vec())
            .collect();
        assert_eq!(
            segments,
            vec![
                vec![t(0)],
                vec![t(100), t(130)],
                vec![t(400), t(410)],
                vec![t(2000)]
            ]
        );
    }

    #[test]
    fn degenerate() {
        assert_eq!(flight(&[0]).split(Gap::default()).count(), 0);
    }

    #[test]
    fn condition_merges() {
        let f = flight(&[0, 1, 1000, 1001, 2000, 2001])
            .assign(
                "altitude",
                Column::Float(
                    [1000.0, 1000.0, 30000.0, 30000.0, 1000.0, 1000.0]
                        .iter()
                        .map(|x| Some(*x))
                        .collect(),
                ),
            )
            .unwrap();
        // Don't split while cruising
        let segments = f.split_with(Duration::minutes(1), |before, after| {
            before.max("altitude").unwrap_or(0.0) < 5000.0
                && after.max("altitude").unwrap_or(0.0) < 5000.0
        });
        let sizes: Vec<usize> = segments.iter().map(|s| s.data().len()).collect();
        assert_eq!(sizes, vec![6]);

        let segments = f.split_with(Duration::minutes(1), |before, _| {
            before.max("altitude").unwrap_or(0.0) < 5000.0
        });
        let sizes: Vec<usize> = segments.iter().map(|s| s.data().len()).collect();
        assert_eq!(sizes, vec![2, 4]);
    }

    #[test]
    fn windows() {
        let f = flight(&(0..10).collect::<Vec<_>>());
        let windows: Vec<Vec<Time>> = f
            .sliding_windows(Duration::seconds(3), Duration::seconds(2))
            .unwrap()
            .iter()
            .map(|s| s.times().to_vec())
            .collect();
        assert_eq!(windows[0], vec![t(0), t(1), t(2)]);
        // Strictly after 0 + 2s
        assert_eq!(windows[1], vec![t(3), t(4), t(5)]);
        assert_eq!(windows.last().unwrap(), &vec![t(9)]);
        assert!(f
            .sliding_windows(Duration::zero(), Duration::seconds(1))
            .is_err());
    }

    #[test]
    fn squawking() {
        let f = flight(&[0, 1, 2, 3, 2000, 2001])
            .assign(
                "squawk",
                Column::Text(
                    ["7700", "7700", "1000", "1000", "7700", "7700"]
                        .iter()
                        .map(|s| Some(s.to_string()))
                        .collect(),
                ),
            )
            .unwrap();
        assert_eq!(f.emergency().count(), 2);
        assert!(!flight(&[0, 1]).emergency().has());
    }
}
