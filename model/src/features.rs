//! Derived values and extra columns computed from a trajectory.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::Duration;
use geo::{Coord, HaversineDistance, LineString, Point, SimplifyIdx};

use crate::clip::Located;
use crate::projection::{Projection, ProjectionKind};
use crate::table::{Column, Value};
use crate::time::{epoch_seconds, round_to, seconds, Time};
use crate::trajectory::{Position, Trajectory, Unique, LATITUDE, LONGITUDE};
use crate::{Error, Result};

const METERS_PER_NM: f64 = 1852.0;

/// How to reduce one column to one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Agg {
    Min,
    Max,
    Mean,
    Median,
    Sum,
    Std,
    Count,
    NUnique,
    First,
    Last,
}

impl FromStr for Agg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "min" => Agg::Min,
            "max" => Agg::Max,
            "mean" => Agg::Mean,
            "median" => Agg::Median,
            "sum" => Agg::Sum,
            "std" => Agg::Std,
            "count" => Agg::Count,
            "nunique" => Agg::NUnique,
            "first" => Agg::First,
            "last" => Agg::Last,
            _ => {
                return Err(Error::UnknownAggregation {
                    field: String::new(),
                    agg: s.to_string(),
                })
            }
        })
    }
}

impl std::fmt::Display for Agg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Agg::Min => "min",
            Agg::Max => "max",
            Agg::Mean => "mean",
            Agg::Median => "median",
            Agg::Sum => "sum",
            Agg::Std => "std",
            Agg::Count => "count",
            Agg::NUnique => "nunique",
            Agg::First => "first",
            Agg::Last => "last",
        };
        write!(f, "{name}")
    }
}

fn reduce(field: &str, column: &Column, agg: Agg) -> Result<Value> {
    let present: Vec<Value> = column
        .values()
        .into_iter()
        .filter(|v| !v.is_null())
        .collect();
    match agg {
        Agg::Count => return Ok(present.len().into()),
        Agg::NUnique => {
            let distinct: BTreeSet<_> = present.iter().map(Value::key).collect();
            return Ok(distinct.len().into());
        }
        Agg::First => return Ok(present.first().cloned().unwrap_or(Value::Null)),
        Agg::Last => return Ok(present.last().cloned().unwrap_or(Value::Null)),
        Agg::Min | Agg::Max if !column.is_numeric() => {
            let wanted = if agg == Agg::Min {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for value in &present {
                if best.map_or(true, |b| value.compare(b) == Some(wanted)) {
                    best = Some(value);
                }
            }
            return Ok(best.cloned().unwrap_or(Value::Null));
        }
        _ => {}
    }

    let Some(values) = column.to_f64().filter(|_| column.is_numeric()) else {
        return Err(Error::UnknownAggregation {
            field: field.to_string(),
            agg: agg.to_string(),
        });
    };
    let mut xs: Vec<f64> = values.into_iter().flatten().collect();
    if xs.is_empty() {
        return Ok(Value::Null);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    Ok(Value::Float(match agg {
        Agg::Min => xs.iter().cloned().fold(f64::INFINITY, f64::min),
        Agg::Max => xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Agg::Mean => mean,
        Agg::Sum => xs.iter().sum(),
        Agg::Median => {
            xs.sort_by(|a, b| a.total_cmp(b));
            let mid = xs.len() / 2;
            if xs.len() % 2 == 0 {
                (xs[mid - 1] + xs[mid]) / 2.0
            } else {
                xs[mid]
            }
        }
        // Sample standard deviation
        Agg::Std => {
            if xs.len() < 2 {
                return Ok(Value::Null);
            }
            (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        }
        Agg::Count | Agg::NUnique | Agg::First | Agg::Last => unreachable!(),
    }))
}

/// Initial great-circle bearing from one position to another, in degrees within [0, 360).
pub fn bearing(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlon = lon2 - lon1;
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Great-circle distance in nautical miles between (latitude, longitude) pairs.
pub fn distance_nm(from: (f64, f64), to: (f64, f64)) -> f64 {
    Point::new(from.1, from.0).haversine_distance(&Point::new(to.1, to.0)) / METERS_PER_NM
}

/// The sample of a trajectory nearest to a set of reference points.
#[derive(Clone, Debug, PartialEq)]
pub struct Closest {
    pub position: Position,
    /// Which of the reference points it's near
    pub point: usize,
    /// Nautical miles
    pub distance: f64,
}

impl Trajectory {
    pub fn callsign(&self) -> Unique {
        self.unique("callsign")
    }

    pub fn icao24(&self) -> Unique {
        self.unique("icao24")
    }

    pub fn flight_id(&self) -> Unique {
        self.unique("flight_id")
    }

    pub fn number(&self) -> Unique {
        self.unique("number")
    }

    pub fn origin(&self) -> Unique {
        self.unique("origin")
    }

    pub fn destination(&self) -> Unique {
        self.unique("destination")
    }

    pub fn diverted(&self) -> Unique {
        self.unique("diverted")
    }

    pub fn registration(&self) -> Unique {
        self.unique("registration")
    }

    pub fn typecode(&self) -> Unique {
        self.unique("typecode")
    }

    /// Every squawk code used, in order of appearance.
    pub fn squawk(&self) -> Vec<Value> {
        match self.unique("squawk") {
            Unique::None => Vec::new(),
            Unique::One(value) => vec![value],
            Unique::Many(values) => values,
        }
    }

    /// Something readable to name the trajectory in logs, like `AFR12 (AF12, 3)`.
    pub fn title(&self) -> String {
        let quiet = |name: &str| match self.data().column(name) {
            Some(column) => {
                let values = column
                    .values()
                    .into_iter()
                    .filter(|v| !v.is_null())
                    .collect::<Vec<_>>();
                match values.first() {
                    Some(first) if values.iter().all(|v| v == first) => Some(first.to_string()),
                    _ => None,
                }
            }
            None => None,
        };
        let callsign = quiet("callsign").or_else(|| quiet("icao24"));
        let extras: Vec<String> = ["number", "flight_id"]
            .into_iter()
            .filter_map(quiet)
            .collect();
        match (callsign, extras.is_empty()) {
            (Some(callsign), true) => callsign,
            (Some(callsign), false) => format!("{callsign} ({})", extras.join(", ")),
            (None, false) => extras.join(", "),
            (None, true) => format!("trajectory starting {}", crate::time::format_time(self.start())),
        }
    }

    /// Reduces a column: `aggregate("altitude", Agg::Max)`.
    pub fn aggregate(&self, field: &str, agg: Agg) -> Result<Value> {
        reduce(field, self.column(field)?, agg)
    }

    /// Reduces a column named like `altitude_max`.
    pub fn aggregate_str(&self, request: &str) -> Result<Value> {
        let (field, agg) = request.rsplit_once('_').ok_or_else(|| Error::UnknownAggregation {
            field: request.to_string(),
            agg: String::new(),
        })?;
        let agg = agg.parse::<Agg>().map_err(|_| Error::UnknownAggregation {
            field: field.to_string(),
            agg: agg.to_string(),
        })?;
        self.aggregate(field, agg)
    }

    pub fn min(&self, feature: &str) -> Option<f64> {
        self.aggregate(feature, Agg::Min).ok()?.as_f64()
    }

    pub fn max(&self, feature: &str) -> Option<f64> {
        self.aggregate(feature, Agg::Max).ok()?.as_f64()
    }

    pub fn mean(&self, feature: &str) -> Option<f64> {
        self.aggregate(feature, Agg::Mean).ok()?.as_f64()
    }

    /// A property (`duration`, a unique column) or an aggregate like `altitude_max`.
    fn feature(&self, feature: &str) -> Result<Value> {
        if let Some((field, agg)) = feature.rsplit_once('_') {
            if let (true, Ok(agg)) = (self.has(field), agg.parse::<Agg>()) {
                return self.aggregate(field, agg);
            }
        }
        self.property(feature)
    }

    pub fn feature_gt(&self, feature: &str, value: impl Into<Value>, strict: bool) -> Result<bool> {
        let ord = self.feature(feature)?.compare(&value.into());
        Ok(match ord {
            Some(std::cmp::Ordering::Greater) => true,
            Some(std::cmp::Ordering::Equal) => !strict,
            _ => false,
        })
    }

    pub fn feature_lt(&self, feature: &str, value: impl Into<Value>, strict: bool) -> Result<bool> {
        let ord = self.feature(feature)?.compare(&value.into());
        Ok(match ord {
            Some(std::cmp::Ordering::Less) => true,
            Some(std::cmp::Ordering::Equal) => !strict,
            _ => false,
        })
    }

    pub fn shorter_than(&self, duration: Duration, strict: bool) -> bool {
        if strict {
            self.duration() < duration
        } else {
            self.duration() <= duration
        }
    }

    pub fn longer_than(&self, duration: Duration, strict: bool) -> bool {
        if strict {
            self.duration() > duration
        } else {
            self.duration() >= duration
        }
    }

    /// Adds `<feature>_abs` columns.
    pub fn abs(&self, features: &[&str]) -> Result<Trajectory> {
        let mut result = self.clone();
        for feature in features {
            let values = self.floats(feature)?;
            result = result.assign(
                &format!("{feature}_abs"),
                Column::Float(values.into_iter().map(|x| x.map(f64::abs)).collect()),
            )?;
        }
        Ok(result)
    }

    /// Adds `<feature>_diff` columns: the change since the previous sample, null on the first one.
    pub fn diff(&self, features: &[&str]) -> Result<Trajectory> {
        let mut result = self.clone();
        for feature in features {
            let values = self.floats(feature)?;
            let mut diffs = vec![None];
            for pair in values.windows(2) {
                diffs.push(match (pair[0], pair[1]) {
                    (Some(a), Some(b)) => Some(b - a),
                    _ => None,
                });
            }
            diffs.truncate(values.len());
            result = result.assign(&format!("{feature}_diff"), Column::Float(diffs))?;
        }
        Ok(result)
    }

    /// Tags every sample with a `flight_id` rendered from a template, like `"{self.callsign}_{i}"`.
    pub fn assign_id(&self, template: &str, idx: usize) -> Result<Trajectory> {
        let id = crate::template::render(template, &crate::template::Context::new(idx, self))?;
        self.assign_value("flight_id", id)
    }

    /// Adds `<feature>_unwrapped` columns, where angles in degrees continue past 360 instead of
    /// jumping back to 0. Absent features are skipped; missing values are left out of the
    /// unwrapping and stay null.
    pub fn unwrap(&self, features: &[&str]) -> Result<Trajectory> {
        let mut result = self.clone();
        for feature in features {
            if !self.has(feature) {
                continue;
            }
            let values = self.floats(feature)?;
            let mut unwrapped = values.clone();
            let mut previous: Option<(f64, f64)> = None;
            for slot in unwrapped.iter_mut() {
                let Some(raw) = *slot else {
                    continue;
                };
                let value = match previous {
                    None => raw,
                    Some((prev_raw, prev_value)) => {
                        let delta = raw - prev_raw;
                        let mut wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
                        if wrapped == -180.0 && delta > 0.0 {
                            wrapped = 180.0;
                        }
                        let correction = if delta.abs() < 180.0 {
                            0.0
                        } else {
                            wrapped - delta
                        };
                        prev_value + delta + correction
                    }
                };
                previous = Some((raw, value));
                *slot = Some(value);
            }
            result = result.assign(&format!("{feature}_unwrapped"), Column::Float(unwrapped))?;
        }
        Ok(result)
    }

    /// Sorts by time and blanks out the positions that were only repeating the last known one,
    /// when a `last_position` column says so. That column is dropped.
    pub fn handle_last_position(&self) -> Result<Trajectory> {
        let sorted = self.sort_by_time();
        let Some(column) = sorted.data().column("last_position") else {
            return Ok(sorted);
        };
        let fresh: Vec<bool> = (0..column.len())
            .map(|i| i == 0 || column.is_null(i) || column.get(i) != column.get(i - 1))
            .collect();
        let stale: Vec<bool> = fresh.iter().map(|f| !f).collect();
        let mut result = sorted.clone();
        for name in [LATITUDE, LONGITUDE, "altitude"] {
            if let Some(column) = sorted.data().column(name) {
                result = result.assign(name, column.fill_where(&stale, &Value::Null))?;
            }
        }
        result.drop_columns(&["last_position"])
    }

    /// The samples in the air: with an altitude, or not flagged `onground`.
    pub fn airborne(&self) -> Option<Trajectory> {
        if self.has("altitude") {
            return self.query(|row| !row.is_null("altitude"));
        }
        if self.has("onground") {
            return self.query(|row| row.bool("onground") == Some(false));
        }
        None
    }

    pub fn onground(&self) -> Option<Trajectory> {
        if self.has("altitude") {
            return self.query(|row| row.is_null("altitude"));
        }
        if self.has("onground") {
            return self.query(|row| row.bool("onground") == Some(true));
        }
        None
    }

    /// (longitude, latitude, altitude) of the samples with a position.
    pub fn coords(&self) -> Vec<(f64, f64, Option<f64>)> {
        self.data()
            .rows()
            .filter_map(|row| Some((row.f64(LONGITUDE)?, row.f64(LATITUDE)?, row.f64("altitude"))))
            .collect()
    }

    /// (longitude, latitude, seconds since the epoch) of the samples with a position.
    pub fn xy_time(&self) -> Vec<(f64, f64, f64)> {
        self.data()
            .rows()
            .zip(self.times())
            .filter_map(|(row, t)| Some((row.f64(LONGITUDE)?, row.f64(LATITUDE)?, epoch_seconds(*t))))
            .collect()
    }

    /// The path, or `None` with fewer than two positions.
    pub fn linestring(&self) -> Option<LineString<f64>> {
        let coords: Vec<Coord<f64>> = self
            .coords()
            .into_iter()
            .map(|(x, y, _)| Coord { x, y })
            .collect();
        (coords.len() >= 2).then(|| LineString::new(coords))
    }

    /// Adds `cumdist`, the great-circle distance flown so far in nautical miles. Optionally adds
    /// `compute_gs` in knots and `compute_track` in degrees, both derived from consecutive positions.
    /// With `reverse`, distances accumulate from the end and rows come out latest first.
    pub fn cumulative_distance(&self, compute_gs: bool, compute_track: bool, reverse: bool) -> Result<Trajectory> {
        let sorted = self.sort_by_time();
        let mut order: Vec<usize> = (0..sorted.data().len()).collect();
        if reverse {
            order.reverse();
        }
        let sorted = sorted.take(&order).unwrap_or(sorted);

        let lats = sorted.floats(LATITUDE)?;
        let lons = sorted.floats(LONGITUDE)?;
        let times = sorted.times();
        let n = times.len();

        let mut cumdist = vec![Some(0.0); n];
        let mut gs = vec![None; n];
        let mut track = vec![None; n];
        let mut total = 0.0;
        for i in 1..n {
            if let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) = (lats[i - 1], lons[i - 1], lats[i], lons[i]) {
                let d = distance_nm((lat1, lon1), (lat2, lon2));
                total += d;
                let hours = seconds(times[i] - times[i - 1]).abs() / 3600.0;
                gs[i] = (hours > 0.0).then(|| d / hours);
                track[i] = Some(if reverse {
                    bearing((lat2, lon2), (lat1, lon1))
                } else {
                    bearing((lat1, lon1), (lat2, lon2))
                });
            }
            cumdist[i] = Some(total);
        }
        // The first sample has nothing to compare to
        if n > 1 {
            gs[0] = gs[1];
            track[0] = track[1];
        }

        let mut result = sorted.assign("cumdist", Column::Float(cumdist))?;
        if compute_gs {
            result = result.assign("compute_gs", Column::Float(gs))?;
        }
        if compute_track {
            result = result.assign("compute_track", Column::Float(track))?;
        }
        Ok(result)
    }

    /// Great-circle distance between the first and last positions, in nautical miles.
    pub fn distance(&self) -> Option<f64> {
        let coords = self.coords();
        let (first, last) = (coords.first()?, coords.last()?);
        Some(distance_nm((first.1, first.0), (last.1, last.0)))
    }

    /// Adds a `distance` column: nautical miles from each sample to a reference point.
    pub fn distance_to(&self, point: &impl Located) -> Result<Trajectory> {
        let to = (point.latitude(), point.longitude());
        let values = self.per_position(|lat, lon| distance_nm((lat, lon), to))?;
        self.assign("distance", Column::Float(values))
    }

    /// Adds a `bearing` column: degrees from each sample towards a reference point.
    pub fn bearing(&self, point: &impl Located) -> Result<Trajectory> {
        let to = (point.latitude(), point.longitude());
        let values = self.per_position(|lat, lon| bearing((lat, lon), to))?;
        self.assign("bearing", Column::Float(values))
    }

    /// The sample closest to any of `points`. `None` without points, or without any position.
    pub fn closest_point<P: Located>(&self, points: &[P]) -> Result<Option<Closest>> {
        let lats = self.floats(LATITUDE)?;
        let lons = self.floats(LONGITUDE)?;
        let mut best: Option<(usize, usize, f64)> = None;
        for (point, reference) in points.iter().enumerate() {
            let to = (reference.latitude(), reference.longitude());
            for (row, (lat, lon)) in lats.iter().zip(&lons).enumerate() {
                let (Some(lat), Some(lon)) = (lat, lon) else {
                    continue;
                };
                let distance = distance_nm((*lat, *lon), to);
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((row, point, distance));
                }
            }
        }
        Ok(best.map(|(row, point, distance)| Closest {
            position: self.position(row),
            point,
            distance,
        }))
    }

    fn per_position(&self, f: impl Fn(f64, f64) -> f64) -> Result<Vec<Option<f64>>> {
        let lats = self.floats(LATITUDE)?;
        let lons = self.floats(LONGITUDE)?;
        Ok(lats
            .into_iter()
            .zip(lons)
            .map(|(lat, lon)| Some(f(lat?, lon?)))
            .collect())
    }

    fn require(&self, columns: &[&str], hint: &str) -> Result<()> {
        for column in columns {
            if !self.has(column) {
                return Err(Error::missing(*column, hint));
            }
        }
        Ok(())
    }

    /// Adds `wind_u` and `wind_v`, the wind triangle solved from ground and air vectors.
    pub fn compute_wind(&self) -> Result<Trajectory> {
        self.require(
            &["heading", "TAS"],
            "No air vector: decode heading and TAS from Mode S replies first.",
        )?;
        self.require(&["groundspeed", "track"], "No ground vector in the trajectory.")?;
        let gs = self.floats("groundspeed")?;
        let track = self.floats("track")?;
        let heading = self.floats("heading")?;
        let tas = self.floats("TAS")?;

        let mut u = Vec::with_capacity(gs.len());
        let mut v = Vec::with_capacity(gs.len());
        for i in 0..gs.len() {
            match (gs[i], track[i], heading[i], tas[i]) {
                (Some(gs), Some(track), Some(heading), Some(tas)) => {
                    let (track, heading) = (track.to_radians(), heading.to_radians());
                    u.push(Some(gs * track.sin() - tas * heading.sin()));
                    v.push(Some(gs * track.cos() - tas * heading.cos()));
                }
                _ => {
                    u.push(None);
                    v.push(None);
                }
            }
        }
        self.assign("wind_u", Column::Float(u))?
            .assign("wind_v", Column::Float(v))
    }

    /// Adds `TAS` and `heading` from the ground vector and the wind.
    pub fn compute_tas(&self) -> Result<Trajectory> {
        self.require(
            &["wind_u", "wind_v"],
            "No wind in the trajectory: include wind_u and wind_v from a weather model first.",
        )?;
        self.require(&["groundspeed", "track"], "No ground vector in the trajectory.")?;
        let gs = self.floats("groundspeed")?;
        let track = self.floats("track")?;
        let wind_u = self.floats("wind_u")?;
        let wind_v = self.floats("wind_v")?;

        let mut tas = Vec::with_capacity(gs.len());
        let mut heading = Vec::with_capacity(gs.len());
        for i in 0..gs.len() {
            match (gs[i], track[i], wind_u[i], wind_v[i]) {
                (Some(gs), Some(track), Some(wu), Some(wv)) => {
                    let x = gs * track.to_radians().sin() - wu;
                    let y = gs * track.to_radians().cos() - wv;
                    tas.push(Some(x.hypot(y)));
                    heading.push(Some(x.atan2(y).to_degrees().rem_euclid(360.0)));
                }
                _ => {
                    tas.push(None);
                    heading.push(None);
                }
            }
        }
        self.assign("TAS", Column::Float(tas))?
            .assign("heading", Column::Float(heading))
    }

    /// Groups samples by timestamps rounded to `freq` and adds one `<field>_<agg>` column per
    /// request, holding the aggregate of the sample's group.
    pub fn agg_time(&self, freq: Duration, requests: &[(&str, Agg)]) -> Result<Trajectory> {
        if requests.is_empty() {
            return Err(Error::invalid("No feature provided for aggregation"));
        }
        let groups = self.time_groups(freq);
        let mut result = self.clone();
        for (field, agg) in requests {
            let column = self.column(field)?;
            let mut values = vec![Value::Null; self.data().len()];
            for rows in groups.values() {
                let value = reduce(field, &column.take(rows), *agg)?;
                for row in rows {
                    values[*row] = value.clone();
                }
            }
            result = result.assign(&format!("{field}_{agg}"), Column::from_values(&values))?;
        }
        Ok(result)
    }

    /// Like `agg_time`, with arbitrary functions of each group's sub-trajectory.
    pub fn apply_time(
        &self,
        freq: Duration,
        functions: &[(&str, &dyn Fn(&Trajectory) -> Value)],
    ) -> Result<Trajectory> {
        if functions.is_empty() {
            return Err(Error::invalid("No feature provided for aggregation"));
        }
        let groups = self.time_groups(freq);
        let mut result = self.clone();
        for (name, f) in functions {
            let mut values = vec![Value::Null; self.data().len()];
            for rows in groups.values() {
                if let Some(group) = self.take(rows) {
                    let value = f(&group);
                    for row in rows {
                        values[*row] = value.clone();
                    }
                }
            }
            result = result.assign(name, Column::from_values(&values))?;
        }
        Ok(result)
    }

    fn time_groups(&self, freq: Duration) -> BTreeMap<Time, Vec<usize>> {
        let mut groups: BTreeMap<Time, Vec<usize>> = BTreeMap::new();
        for (row, t) in self.times().iter().enumerate() {
            groups.entry(round_to(*t, freq)).or_default().push(row);
        }
        groups
    }

    /// Keeps the samples needed to draw the path within `tolerance` meters (Douglas-Peucker in a
    /// projection centered on the trajectory). Samples without a position are dropped.
    pub fn simplify(&self, tolerance: f64) -> Result<Trajectory> {
        let projection = Projection::centered(ProjectionKind::Lcc, self)?;
        let mut rows = Vec::new();
        let mut coords = Vec::new();
        for row in self.data().rows() {
            if let (Some(lat), Some(lon)) = (row.f64(LATITUDE), row.f64(LONGITUDE)) {
                let (x, y) = projection.forward(lon, lat);
                rows.push(row.index());
                coords.push(Coord { x, y });
            }
        }
        let kept: Vec<usize> = LineString::new(coords)
            .simplify_idx(&tolerance)
            .into_iter()
            .map(|i| rows[i])
            .collect();
        self.take(&kept)
            .ok_or_else(|| Error::invalid("nothing left to simplify"))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::trajectory::tests::{flight, t};

    fn with_floats(f: Trajectory, name: &str, values: &[f64]) -> Trajectory {
        f.assign(name, Column::floats(values.to_vec())).unwrap()
    }

    #[test]
    fn aggregates() {
        let f = with_floats(flight(&[0, 1, 2, 3]), "altitude", &[1000.0, 3000.0, f64::NAN, 2000.0]);
        assert_eq!(f.aggregate("altitude", Agg::Max).unwrap(), Value::Float(3000.0));
        assert_eq!(f.aggregate_str("altitude_mean").unwrap(), Value::Float(2000.0));
        assert_eq!(f.aggregate("altitude", Agg::Count).unwrap(), Value::Int(3));
        assert_eq!(f.aggregate("altitude", Agg::Median).unwrap(), Value::Float(2000.0));
        assert!(matches!(
            f.aggregate_str("altitude_average"),
            Err(Error::UnknownAggregation { .. })
        ));
        assert!(f.aggregate("nope", Agg::Max).is_err());

        assert!(f.feature_gt("altitude_max", 2500.0, true).unwrap());
        assert!(!f.feature_lt("altitude_max", 3000.0, true).unwrap());
        assert!(f.feature_lt("altitude_max", 3000.0, false).unwrap());
        assert!(f.feature_gt("duration", Duration::seconds(2), true).unwrap());
        assert!(f.longer_than(Duration::seconds(3), false));
        assert!(!f.longer_than(Duration::seconds(3), true));
    }

    #[test]
    fn unwrap_angles() {
        let f = with_floats(flight(&[0, 1, 2, 3, 4]), "track", &[345.0, 355.0, 5.0, f64::NAN, 15.0]);
        let unwrapped = f.unwrap(&["track", "heading"]).unwrap();
        assert_eq!(
            unwrapped.floats("track_unwrapped").unwrap(),
            vec![Some(345.0), Some(355.0), Some(365.0), None, Some(375.0)]
        );
        assert!(!unwrapped.has("heading_unwrapped"));
    }

    #[test]
    fn last_position() {
        let f = with_floats(flight(&[0, 1, 2]), "altitude", &[1.0, 2.0, 3.0])
            .assign(
                "last_position",
                Column::Time(vec![Some(t(0)), Some(t(0)), Some(t(2))]),
            )
            .unwrap();
        let handled = f.handle_last_position().unwrap();
        assert!(!handled.has("last_position"));
        assert_eq!(handled.floats("altitude").unwrap(), vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(handled.floats("latitude").unwrap()[1], None);
    }

    #[test]
    fn distances() {
        // Along the equator, 0.01 degree per sample
        let f = flight(&[0, 60, 120]);
        let with = f.cumulative_distance(true, true, false).unwrap();
        let cumdist = with.floats("cumdist").unwrap();
        // One degree of longitude on the equator is 60 nm
        assert_relative_eq!(cumdist[2].unwrap(), 1.2, epsilon = 0.01);
        assert_relative_eq!(with.floats("compute_gs").unwrap()[1].unwrap(), 36.0, epsilon = 0.1);
        assert_relative_eq!(with.floats("compute_track").unwrap()[0].unwrap(), 90.0, epsilon = 1e-6);
        assert_relative_eq!(f.distance().unwrap(), 1.2, epsilon = 0.01);

        let back = f.cumulative_distance(false, true, true).unwrap();
        assert_eq!(back.times()[0], t(120));
        assert_relative_eq!(back.floats("compute_track").unwrap()[1].unwrap(), 90.0, epsilon = 1e-6);
        assert_relative_eq!(bearing((0.0, 0.0), (1.0, 0.0)), 0.0, epsilon = 1e-9);

        // Towards a navaid one degree north of the start
        let navaid = Point::new(0.0, 1.0);
        let towards = f.distance_to(&navaid).unwrap().bearing(&navaid).unwrap();
        assert_relative_eq!(towards.floats("distance").unwrap()[0].unwrap(), 60.0, epsilon = 0.1);
        assert_relative_eq!(towards.floats("bearing").unwrap()[0].unwrap(), 0.0, epsilon = 1e-9);
        assert!(towards.floats("bearing").unwrap()[2].unwrap() > 270.0);

        // The second reference point is just past the last sample
        let closest = f
            .closest_point(&[(1.0, 0.0), (0.0, 0.025)])
            .unwrap()
            .unwrap();
        assert_eq!(closest.point, 1);
        assert_eq!(closest.position.timestamp, t(120));
        assert_relative_eq!(closest.distance, 0.3, epsilon = 0.01);
        let nowhere: [(f64, f64); 0] = [];
        assert!(f.closest_point(&nowhere).unwrap().is_none());
    }

    #[test]
    fn wind_triangle() {
        let f = flight(&[0, 1]);
        assert!(matches!(
            f.compute_wind(),
            Err(Error::MissingColumn { column, .. }) if column == "heading"
        ));
        assert!(matches!(
            f.compute_tas(),
            Err(Error::MissingColumn { column, .. }) if column == "wind_u"
        ));

        // Flying north at 400 kts through a 50 kts wind blowing towards the east
        let f = with_floats(f, "groundspeed", &[410.0, 410.0]);
        let f = with_floats(f, "track", &[0.0, 0.0]);
        let f = with_floats(f, "wind_u", &[50.0, 50.0]);
        let f = with_floats(f, "wind_v", &[0.0, 0.0]);
        let air = f.compute_tas().unwrap();
        let tas = air.floats("TAS").unwrap()[0].unwrap();
        assert_relative_eq!(tas, (410.0f64.powi(2) + 50.0f64.powi(2)).sqrt(), epsilon = 1e-9);
        // And back again
        let wind = air.drop_columns(&["wind_u", "wind_v"]).unwrap().compute_wind().unwrap();
        assert_relative_eq!(wind.floats("wind_u").unwrap()[0].unwrap(), 50.0, epsilon = 1e-6);
        assert_relative_eq!(wind.floats("wind_v").unwrap()[0].unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn time_windows() {
        let f = with_floats(flight(&[0, 10, 20, 70, 80]), "altitude", &[1.0, 2.0, 3.0, 10.0, 20.0]);
        assert!(f.agg_time(Duration::minutes(1), &[]).is_err());
        let agg = f.agg_time(Duration::minutes(1), &[("altitude", Agg::Max)]).unwrap();
        assert_eq!(
            agg.floats("altitude_max").unwrap(),
            vec![Some(3.0), Some(3.0), Some(3.0), Some(20.0), Some(20.0)]
        );
        let count: &dyn Fn(&Trajectory) -> Value = &|g| Value::from(g.data().len());
        let applied = f.apply_time(Duration::minutes(1), &[("n", count)]).unwrap();
        assert_eq!(applied.data().get(4, "n"), Value::Int(2));
    }

    #[test]
    fn simplify_straight_line() {
        let f = flight(&[0, 1, 2, 3, 4]);
        let simple = f.simplify(10.0).unwrap();
        assert_eq!(simple.times(), &[t(0), t(4)]);
    }
}
