use std::str::FromStr;

use chrono::Duration;

use crate::projection::{Projection, ProjectionKind};
use crate::table::{Column, Table};
use crate::time::{floor_to, format_duration, parse_duration, start_of_day, Time};
use crate::trajectory::{Trajectory, TIMESTAMP};
use crate::{Error, Result};

/// Features holding angles in degrees, unwrapped before resampling.
pub const ANGLE_FEATURES: [&str; 2] = ["track", "heading"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleRule {
    /// One sample per period, on a grid anchored at midnight
    Rate(Duration),
    /// Exactly this many evenly spaced samples, each copied from the nearest original one
    Count(usize),
}

impl Default for ResampleRule {
    fn default() -> Self {
        ResampleRule::Rate(Duration::seconds(1))
    }
}

impl From<Duration> for ResampleRule {
    fn from(d: Duration) -> Self {
        ResampleRule::Rate(d)
    }
}

impl From<usize> for ResampleRule {
    fn from(n: usize) -> Self {
        ResampleRule::Count(n)
    }
}

/// `"1s"` or `"10 min"` for a rate, a bare integer like `"10"` for a count.
impl FromStr for ResampleRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(n) = s.trim().parse::<usize>() {
            return Ok(ResampleRule::Count(n));
        }
        Ok(ResampleRule::Rate(parse_duration(s)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMethod {
    Interpolate,
    Ffill,
    Bfill,
    Nearest,
}

impl FromStr for FillMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interpolate" => Ok(FillMethod::Interpolate),
            "ffill" | "pad" => Ok(FillMethod::Ffill),
            "bfill" | "backfill" => Ok(FillMethod::Bfill),
            "nearest" => Ok(FillMethod::Nearest),
            _ => Err(Error::invalid(format!(
                "unknown fill method {s:?}; try interpolate, ffill, bfill or nearest"
            ))),
        }
    }
}

/// Which fill method applies to which column, for rate resampling.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum How {
    /// Numeric columns are interpolated, text columns forward filled, anything else left alone.
    #[default]
    Default,
    /// The same method for every column. `Interpolate` means `Default`.
    All(FillMethod),
    /// Only the listed columns are filled. The others keep gaps where no sample fell.
    Columns(Vec<(FillMethod, Vec<String>)>),
    /// Nothing is filled.
    Nothing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    /// A polynomial of this order through the nearest known values
    Polynomial(usize),
}

/// Where to interpolate positions: in a plane instead of in latitude/longitude, which follows
/// great circles much better across long gaps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlanarProjection {
    /// Built on the fly, centered on the trajectory
    Centered(ProjectionKind),
    Fixed(Projection),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResampleOptions {
    pub rule: ResampleRule,
    pub how: How,
    pub interpolation: Interpolation,
    pub projection: Option<PlanarProjection>,
}

impl ResampleOptions {
    pub fn new(rule: impl Into<ResampleRule>) -> Self {
        Self {
            rule: rule.into(),
            ..Default::default()
        }
    }
}

impl Trajectory {
    /// Resamples with the default options: interpolating numbers and carrying text forward.
    pub fn resample(&self, rule: impl Into<ResampleRule>) -> Result<Trajectory> {
        self.resample_with(&ResampleOptions::new(rule))
    }

    pub fn resample_with(&self, options: &ResampleOptions) -> Result<Trajectory> {
        let projection = match options.projection {
            None => None,
            Some(PlanarProjection::Fixed(p)) => Some(p),
            Some(PlanarProjection::Centered(kind)) => Some(Projection::centered(kind, self)?),
        };
        let source = match &projection {
            Some(p) => self.compute_xy(p)?,
            None => self.clone(),
        };
        // Resample angles continuously across north
        let source = source
            .handle_last_position()?
            .unwrap(&ANGLE_FEATURES)?;

        let data = match options.rule {
            ResampleRule::Rate(step) => by_rate(&source, step, options)?,
            ResampleRule::Count(n) => by_count(&source, n)?,
        };

        let mut result = Trajectory::new(data)?;
        for feature in ANGLE_FEATURES {
            let unwrapped = format!("{feature}_unwrapped");
            if result.has(&unwrapped) {
                let wrapped = result
                    .floats(&unwrapped)?
                    .into_iter()
                    .map(|x| x.map(|x| x.rem_euclid(360.0)))
                    .collect();
                result = result.assign(feature, Column::Float(wrapped))?;
            }
        }

        match projection {
            Some(p) => result.compute_latlon_from_xy(&p),
            None => Ok(result),
        }
    }
}

fn by_rate(source: &Trajectory, step: Duration, options: &ResampleOptions) -> Result<Table> {
    if step <= Duration::zero() {
        return Err(Error::invalid(format!(
            "resampling needs a positive period, not {}",
            format_duration(step)
        )));
    }
    let origin = start_of_day(source.start());
    let first = floor_to(source.start(), step, origin);
    let last = floor_to(source.stop(), step, origin);
    let step_us = step.num_microseconds().unwrap_or(i64::MAX);
    let bins_of = |t: Time| -> usize {
        let offset = (floor_to(t, step, origin) - first)
            .num_microseconds()
            .unwrap_or(0);
        (offset / step_us) as usize
    };
    let num_bins = bins_of(last) + 1;
    let grid: Vec<Time> = (0..num_bins)
        .map(|i| first + Duration::microseconds(step_us * i as i64))
        .collect();
    let bins: Vec<usize> = source.times().iter().map(|t| bins_of(*t)).collect();

    let mut columns = Vec::new();
    for (name, column) in source.data().columns() {
        if name == TIMESTAMP {
            columns.push((
                name.clone(),
                Column::Time(grid.iter().map(|t| Some(*t)).collect()),
            ));
            continue;
        }
        let binned = first_per_bin(column, &bins, num_bins);
        let filled = match fill_method(&options.how, name, &binned) {
            Some(method) => fill(&binned, method, options.interpolation),
            None => binned,
        };
        columns.push((name.clone(), filled));
    }
    Table::new(columns)
}

fn by_count(source: &Trajectory, n: usize) -> Result<Table> {
    if n == 0 {
        return Err(Error::invalid("can't resample to zero samples"));
    }
    let start = source.start();
    let span = source.duration().num_microseconds().unwrap_or(i64::MAX);
    let targets: Vec<Time> = (0..n)
        .map(|i| {
            if n == 1 {
                start
            } else {
                let offset = (span as f64 * i as f64 / (n - 1) as f64).round() as i64;
                start + Duration::microseconds(offset)
            }
        })
        .collect();

    // handle_last_position sorted the rows
    let times = source.times();
    let indices: Vec<usize> = targets
        .iter()
        .map(|target| {
            let after = times.partition_point(|t| t < target);
            if after == 0 {
                return 0;
            }
            if after == times.len() {
                return times.len() - 1;
            }
            // Ties go to the later sample
            if *target - times[after - 1] < times[after] - *target {
                after - 1
            } else {
                after
            }
        })
        .collect();

    let picked = source.data().take(&indices);
    picked.with_column(
        TIMESTAMP,
        Column::Time(targets.into_iter().map(Some).collect()),
    )
}

fn fill_method(how: &How, name: &str, column: &Column) -> Option<FillMethod> {
    match how {
        How::Default | How::All(FillMethod::Interpolate) => match column {
            Column::Float(_) | Column::Int(_) => Some(FillMethod::Interpolate),
            Column::Text(_) => Some(FillMethod::Ffill),
            Column::Bool(_) | Column::Time(_) => None,
        },
        How::All(method) => Some(*method),
        How::Columns(groups) => groups
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(method, _)| *method),
        How::Nothing => None,
    }
}

fn first_per_bin(column: &Column, bins: &[usize], num_bins: usize) -> Column {
    fn first<T: Clone>(values: &[Option<T>], bins: &[usize], num_bins: usize) -> Vec<Option<T>> {
        let mut out = vec![None; num_bins];
        for (value, bin) in values.iter().zip(bins) {
            if out[*bin].is_none() {
                out[*bin] = value.clone();
            }
        }
        out
    }
    match column {
        Column::Float(x) => Column::Float(first(x, bins, num_bins)),
        Column::Int(x) => Column::Int(first(x, bins, num_bins)),
        Column::Bool(x) => Column::Bool(first(x, bins, num_bins)),
        Column::Text(x) => Column::Text(first(x, bins, num_bins)),
        Column::Time(x) => Column::Time(first(x, bins, num_bins)),
    }
}

fn fill(column: &Column, method: FillMethod, interpolation: Interpolation) -> Column {
    fn apply<T: Clone>(values: &[Option<T>], method: FillMethod) -> Vec<Option<T>> {
        match method {
            FillMethod::Ffill | FillMethod::Interpolate => forward_fill(values),
            FillMethod::Bfill => {
                let mut reversed: Vec<Option<T>> = values.iter().rev().cloned().collect();
                reversed = forward_fill(&reversed);
                reversed.reverse();
                reversed
            }
            FillMethod::Nearest => nearest_fill(values),
        }
    }

    if method == FillMethod::Interpolate {
        if let Some(values) = column.to_f64().filter(|_| column.is_numeric()) {
            return Column::Float(interpolate(&values, interpolation));
        }
        warn!(
            "Can't interpolate a {} column, carrying values forward instead",
            column.dtype()
        );
    }
    match column {
        Column::Float(x) => Column::Float(apply(x, method)),
        Column::Int(x) => Column::Int(apply(x, method)),
        Column::Bool(x) => Column::Bool(apply(x, method)),
        Column::Text(x) => Column::Text(apply(x, method)),
        Column::Time(x) => Column::Time(apply(x, method)),
    }
}

fn forward_fill<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let mut last = None;
    values
        .iter()
        .map(|value| {
            if value.is_some() {
                last = value.clone();
            }
            last.clone()
        })
        .collect()
}

fn nearest_fill<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    let known: Vec<usize> = (0..values.len()).filter(|i| values[*i].is_some()).collect();
    if known.is_empty() {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let after = known.partition_point(|k| *k < i);
            let candidate = match (after.checked_sub(1).map(|j| known[j]), known.get(after)) {
                (Some(before), Some(after)) => {
                    // Ties go to the earlier value
                    if i - before <= after - i {
                        before
                    } else {
                        *after
                    }
                }
                (Some(before), None) => before,
                (None, Some(after)) => *after,
                (None, None) => i,
            };
            values[candidate].clone()
        })
        .collect()
}

/// Fills the gaps between known values. Before the first known value stays empty, after the last
/// one repeats it.
fn interpolate(values: &[Option<f64>], interpolation: Interpolation) -> Vec<Option<f64>> {
    let known: Vec<usize> = (0..values.len()).filter(|i| values[*i].is_some()).collect();
    let mut out = values.to_vec();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return out;
    };
    for (i, slot) in out.iter_mut().enumerate() {
        if slot.is_some() || i < first {
            continue;
        }
        if i > last {
            *slot = values[last];
            continue;
        }
        // known[k] < i < known[k + 1]
        let k = known.partition_point(|j| *j < i) - 1;
        *slot = Some(match interpolation {
            Interpolation::Linear => {
                let (x0, x1) = (known[k], known[k + 1]);
                let (y0, y1) = (value_at(values, x0), value_at(values, x1));
                y0 + (y1 - y0) * (i - x0) as f64 / (x1 - x0) as f64
            }
            Interpolation::Polynomial(order) => {
                let size = (order + 1).clamp(2, known.len());
                let start = (k + 1)
                    .saturating_sub(size / 2)
                    .min(known.len() - size);
                lagrange(values, &known[start..start + size], i as f64)
            }
        });
    }
    out
}

fn value_at(values: &[Option<f64>], i: usize) -> f64 {
    values[i].unwrap_or(f64::NAN)
}

fn lagrange(values: &[Option<f64>], points: &[usize], x: f64) -> f64 {
    let mut total = 0.0;
    for (a, xa) in points.iter().enumerate() {
        let mut term = value_at(values, *xa);
        for (b, xb) in points.iter().enumerate() {
            if a != b {
                term *= (x - *xb as f64) / (*xa as f64 - *xb as f64);
            }
        }
        total += term;
    }
    total
}
