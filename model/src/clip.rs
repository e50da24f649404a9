use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Intersects, Line, MultiPolygon, Point, Polygon, Rect};

use crate::interval::{Interval, IntervalCollection};
use crate::segments::Segments;
use crate::time::{lerp, Time};
use crate::trajectory::{Trajectory, LATITUDE, LONGITUDE};
use crate::Result;

/// A 2D region in longitude/latitude degrees that trajectories can be clipped to. Altitude is
/// ignored.
pub trait Shape {
    fn shape(&self) -> MultiPolygon<f64>;
}

impl Shape for MultiPolygon<f64> {
    fn shape(&self) -> MultiPolygon<f64> {
        self.clone()
    }
}

impl Shape for Polygon<f64> {
    fn shape(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![self.clone()])
    }
}

impl Shape for Rect<f64> {
    fn shape(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![self.to_polygon()])
    }
}

/// A reference point, like an airport or a navaid.
pub trait Located {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
}

/// (latitude, longitude)
impl Located for (f64, f64) {
    fn latitude(&self) -> f64 {
        self.0
    }

    fn longitude(&self) -> f64 {
        self.1
    }
}

impl Located for Point<f64> {
    fn latitude(&self) -> f64 {
        self.y()
    }

    fn longitude(&self) -> f64 {
        self.x()
    }
}

/// The time windows during which the path is inside the shape, merged when they touch or overlap.
/// A path that only grazes the shape at a single instant doesn't count.
pub fn inside_windows(trajectory: &Trajectory, shape: &MultiPolygon<f64>) -> Result<IntervalCollection> {
    let samples = positions(trajectory)?;
    if samples.len() < 2 {
        return Ok(IntervalCollection::default());
    }

    let mut windows: Vec<Interval> = Vec::new();
    for pair in samples.windows(2) {
        let (a, t1) = pair[0];
        let (b, t2) = pair[1];
        for (s1, s2) in inside_pieces(Line::new(a, b), shape) {
            let window = Interval {
                start: lerp(t1, t2, s1),
                stop: lerp(t1, t2, s2),
            };
            // A path crossing the boundary back and forth may produce pieces that overlap in time
            match windows.last_mut() {
                Some(last) if window.start <= last.stop => {
                    last.stop = last.stop.max(window.stop);
                }
                _ => windows.push(window),
            }
        }
    }
    windows.retain(|w| w.start < w.stop);
    Ok(windows.into_iter().collect())
}

/// Samples with a known position, as (longitude, latitude), in row order.
fn positions(trajectory: &Trajectory) -> Result<Vec<(Coord<f64>, Time)>> {
    let lats = trajectory.floats(LATITUDE)?;
    let lons = trajectory.floats(LONGITUDE)?;
    Ok(lats
        .into_iter()
        .zip(lons)
        .zip(trajectory.times())
        .filter_map(|((lat, lon), t)| Some((Coord { x: lon?, y: lat? }, *t)))
        .collect())
}

/// The fractions of the segment inside the shape, as (from, to) pairs.
fn inside_pieces(segment: Line<f64>, shape: &MultiPolygon<f64>) -> Vec<(f64, f64)> {
    let delta = segment.delta();
    let length_sq = delta.x * delta.x + delta.y * delta.y;
    if length_sq == 0.0 {
        // Not moving
        return if shape.intersects(&Point::from(segment.start)) {
            vec![(0.0, 1.0)]
        } else {
            Vec::new()
        };
    }

    let fraction = |c: Coord<f64>| -> f64 {
        (((c.x - segment.start.x) * delta.x + (c.y - segment.start.y) * delta.y) / length_sq)
            .clamp(0.0, 1.0)
    };
    let mut cuts = vec![0.0, 1.0];
    for polygon in shape {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for edge in ring.lines() {
                match line_intersection(segment, edge) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        cuts.push(fraction(intersection));
                    }
                    Some(LineIntersection::Collinear { intersection }) => {
                        cuts.push(fraction(intersection.start));
                        cuts.push(fraction(intersection.end));
                    }
                    None => {}
                }
            }
        }
    }
    cuts.sort_by(|a, b| a.total_cmp(b));
    cuts.dedup();

    let mut pieces: Vec<(f64, f64)> = Vec::new();
    for pair in cuts.windows(2) {
        let mid = (pair[0] + pair[1]) / 2.0;
        let probe = Point::new(
            segment.start.x + mid * delta.x,
            segment.start.y + mid * delta.y,
        );
        if !shape.intersects(&probe) {
            continue;
        }
        match pieces.last_mut() {
            Some(last) if last.1 == pair[0] => last.1 = pair[1],
            _ => pieces.push((pair[0], pair[1])),
        }
    }
    pieces
}

impl Trajectory {
    /// The part of the trajectory from its first entry into the shape to its last exit, samples
    /// on the boundary included. `None` if it never goes in.
    ///
    /// If the path goes in and out several times, whatever happened outside in between is kept.
    pub fn clip(&self, shape: &impl Shape) -> Result<Option<Trajectory>> {
        self.clip_with(shape, false)
    }

    pub fn clip_with(&self, shape: &impl Shape, strict: bool) -> Result<Option<Trajectory>> {
        let windows = inside_windows(self, &shape.shape())?;
        Ok(windows
            .span()
            .and_then(|span| self.slice(&span, strict)))
    }

    /// One segment per visit inside the shape, samples on the boundary included.
    pub fn clip_iterate(&self, shape: &impl Shape) -> Result<Segments> {
        self.clip_iterate_with(shape, false)
    }

    pub fn clip_iterate_with(&self, shape: &impl Shape, strict: bool) -> Result<Segments> {
        let windows = inside_windows(self, &shape.shape())?;
        let trajectory = self.clone();
        Ok(Segments::new("clip_iterate", move || {
            let trajectory = trajectory.clone();
            windows
                .clone()
                .into_iter()
                .filter_map(move |window| trajectory.slice(&window, strict))
        }))
    }

    /// True if the path touches the shape at all, even at a single point.
    pub fn intersects(&self, shape: &impl Shape) -> Result<bool> {
        let shape = shape.shape();
        let samples = positions(self)?;
        Ok(match samples.as_slice() {
            [] => false,
            [(only, _)] => shape.intersects(&Point::from(*only)),
            _ => samples
                .windows(2)
                .any(|pair| shape.intersects(&Line::new(pair[0].0, pair[1].0))),
        })
    }
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon};

    use super::*;
    use crate::trajectory::tests::t;

    // Flying east along latitude 0 at one degree per minute
    fn eastbound(lons: &[f64]) -> Trajectory {
        let points: Vec<(Time, f64, f64)> = lons
            .iter()
            .enumerate()
            .map(|(idx, lon)| (t(60 * idx as i64), 0.0, *lon))
            .collect();
        Trajectory::from_points(&points).unwrap()
    }

    fn square(min: f64, max: f64) -> Rect<f64> {
        Rect::new(coord! { x: min, y: -1.0 }, coord! { x: max, y: 1.0 })
    }

    #[test]
    fn containment() {
        let f = eastbound(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(f.clip(&square(-10.0, 10.0)).unwrap(), Some(f.clone()));
        assert_eq!(f.clip(&square(20.0, 30.0)).unwrap(), None);
        assert!(!f.intersects(&square(20.0, 30.0)).unwrap());
    }

    #[test]
    fn entry_and_exit_times() {
        let f = eastbound(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let windows = inside_windows(&f, &square(1.5, 2.5).shape()).unwrap();
        assert_eq!(windows.len(), 1);
        let window = windows.first().unwrap();
        assert_eq!(window.start, t(90));
        assert_eq!(window.stop, t(150));
        let clipped = f.clip(&square(1.5, 2.5)).unwrap().unwrap();
        assert_eq!(clipped.times(), &[t(120)]);
    }

    #[test]
    fn separate_visits() {
        // Out, in, out, in again
        let f = eastbound(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let shape = MultiPolygon::new(vec![
            square(0.5, 1.5).to_polygon(),
            square(3.5, 4.5).to_polygon(),
        ]);
        let visits = f.clip_iterate(&shape).unwrap();
        assert_eq!(visits.count(), 2);
        let clipped = f.clip(&shape).unwrap().unwrap();
        assert_eq!(clipped.times(), &[t(60), t(120), t(180), t(240)]);
    }

    #[test]
    fn touching_is_not_clipping() {
        let f = eastbound(&[0.0, 1.0]);
        let corner = polygon![
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
        ];
        assert!(f.intersects(&corner).unwrap());
        assert_eq!(f.clip(&corner).unwrap(), None);
    }
}
