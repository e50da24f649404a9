//! Planar projections on a spherical earth, enough to interpolate or simplify a path locally.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::str::FromStr;

use crate::table::Column;
use crate::trajectory::{Trajectory, LATITUDE, LONGITUDE};
use crate::{Error, Result};

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionKind {
    /// Lambert conformal conic
    Lcc,
    /// Albers equal-area conic
    Aea,
    Merc,
}

impl FromStr for ProjectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lcc" | "lambert" => Ok(ProjectionKind::Lcc),
            "aea" | "albers" => Ok(ProjectionKind::Aea),
            "merc" | "mercator" => Ok(ProjectionKind::Merc),
            _ => Err(Error::invalid(format!(
                "unknown projection {s:?}; try lcc, aea or merc"
            ))),
        }
    }
}

/// A projection with its parameters, in degrees: `lat_1`/`lat_2` are the standard parallels of
/// the conics, `lat_0`/`lon_0` the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub kind: ProjectionKind,
    pub lat_0: f64,
    pub lon_0: f64,
    pub lat_1: f64,
    pub lat_2: f64,
}

impl Projection {
    /// Centered on a trajectory: standard parallels at the extreme latitudes, origin at the mean
    /// position.
    pub fn centered(kind: ProjectionKind, trajectory: &Trajectory) -> Result<Self> {
        let lats: Vec<f64> = trajectory.floats(LATITUDE)?.into_iter().flatten().collect();
        let lons: Vec<f64> = trajectory.floats(LONGITUDE)?.into_iter().flatten().collect();
        if lats.is_empty() || lons.is_empty() {
            return Err(Error::invalid("can't center a projection without any position"));
        }
        let min = lats.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = lats.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self {
            kind,
            lat_0: lats.iter().sum::<f64>() / lats.len() as f64,
            lon_0: lons.iter().sum::<f64>() / lons.len() as f64,
            lat_1: min,
            lat_2: max,
        })
    }

    /// (longitude, latitude) in degrees to (x, y) in meters
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lambda = wrap_radians((lon - self.lon_0).to_radians());
        let phi = lat.to_radians();
        match self.cone() {
            Cone::Lambert { n, f, rho_0 } => {
                let rho = EARTH_RADIUS_M * f / tan_half(phi).powf(n);
                let theta = n * lambda;
                (rho * theta.sin(), rho_0 - rho * theta.cos())
            }
            Cone::Albers { n, c, rho_0 } => {
                let rho = EARTH_RADIUS_M * (c - 2.0 * n * phi.sin()).max(0.0).sqrt() / n;
                let theta = n * lambda;
                (rho * theta.sin(), rho_0 - rho * theta.cos())
            }
            Cone::Cylinder => (
                EARTH_RADIUS_M * lambda,
                EARTH_RADIUS_M * tan_half(phi).ln(),
            ),
        }
    }

    /// (x, y) in meters back to (longitude, latitude) in degrees
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let (lambda, phi) = match self.cone() {
            Cone::Lambert { n, f, rho_0 } => {
                let dy = rho_0 - y;
                let rho = n.signum() * (x * x + dy * dy).sqrt();
                let theta = (x * n.signum()).atan2(dy * n.signum());
                let phi = if rho == 0.0 {
                    n.signum() * FRAC_PI_2
                } else {
                    2.0 * (EARTH_RADIUS_M * f / rho).powf(1.0 / n).atan() - FRAC_PI_2
                };
                (theta / n, phi)
            }
            Cone::Albers { n, c, rho_0 } => {
                let dy = rho_0 - y;
                let rho = (x * x + dy * dy).sqrt();
                let theta = (x * n.signum()).atan2(dy * n.signum());
                let sin_phi = (c - (rho * n / EARTH_RADIUS_M).powi(2)) / (2.0 * n);
                (theta / n, sin_phi.clamp(-1.0, 1.0).asin())
            }
            Cone::Cylinder => (
                x / EARTH_RADIUS_M,
                2.0 * (y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2,
            ),
        };
        (
            wrap_degrees(self.lon_0 + lambda.to_degrees()),
            phi.to_degrees(),
        )
    }

    fn cone(&self) -> Cone {
        let phi_0 = self.lat_0.to_radians();
        let phi_1 = self.lat_1.to_radians();
        let phi_2 = self.lat_2.to_radians();
        match self.kind {
            ProjectionKind::Lcc => {
                let n = if (phi_1 - phi_2).abs() < 1e-10 {
                    phi_1.sin()
                } else {
                    (phi_1.cos() / phi_2.cos()).ln() / (tan_half(phi_2) / tan_half(phi_1)).ln()
                };
                // Around the equator the cone degenerates into a cylinder
                if n.abs() < 1e-10 || !n.is_finite() {
                    return Cone::Cylinder;
                }
                let f = phi_1.cos() * tan_half(phi_1).powf(n) / n;
                let rho_0 = EARTH_RADIUS_M * f / tan_half(phi_0).powf(n);
                Cone::Lambert { n, f, rho_0 }
            }
            ProjectionKind::Aea => {
                let n = (phi_1.sin() + phi_2.sin()) / 2.0;
                if n.abs() < 1e-10 {
                    return Cone::Cylinder;
                }
                let c = phi_1.cos().powi(2) + 2.0 * n * phi_1.sin();
                let rho_0 = EARTH_RADIUS_M * (c - 2.0 * n * phi_0.sin()).max(0.0).sqrt() / n;
                Cone::Albers { n, c, rho_0 }
            }
            ProjectionKind::Merc => Cone::Cylinder,
        }
    }
}

enum Cone {
    Lambert { n: f64, f: f64, rho_0: f64 },
    Albers { n: f64, c: f64, rho_0: f64 },
    Cylinder,
}

fn tan_half(phi: f64) -> f64 {
    (FRAC_PI_4 + phi / 2.0).tan()
}

fn wrap_radians(x: f64) -> f64 {
    let wrapped = (x + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI);
    wrapped - std::f64::consts::PI
}

fn wrap_degrees(x: f64) -> f64 {
    (x + 180.0).rem_euclid(360.0) - 180.0
}

impl Trajectory {
    /// Adds `x` and `y` columns, in meters.
    pub fn compute_xy(&self, projection: &Projection) -> Result<Trajectory> {
        let lats = self.floats(LATITUDE)?;
        let lons = self.floats(LONGITUDE)?;
        let (xs, ys): (Vec<Option<f64>>, Vec<Option<f64>>) = lats
            .iter()
            .zip(&lons)
            .map(|(lat, lon)| match (lat, lon) {
                (Some(lat), Some(lon)) => {
                    let (x, y) = projection.forward(*lon, *lat);
                    (Some(x), Some(y))
                }
                _ => (None, None),
            })
            .unzip();
        self.assign("x", Column::Float(xs))?
            .assign("y", Column::Float(ys))
    }

    /// Replaces `latitude` and `longitude` from the `x` and `y` columns.
    pub fn compute_latlon_from_xy(&self, projection: &Projection) -> Result<Trajectory> {
        let xs = self
            .floats("x")
            .map_err(|_| Error::missing("x", "Consider Trajectory::compute_xy first."))?;
        let ys = self
            .floats("y")
            .map_err(|_| Error::missing("y", "Consider Trajectory::compute_xy first."))?;
        let (lons, lats): (Vec<Option<f64>>, Vec<Option<f64>>) = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => {
                    let (lon, lat) = projection.inverse(*x, *y);
                    (Some(lon), Some(lat))
                }
                _ => (None, None),
            })
            .unzip();
        self.assign(LATITUDE, Column::Float(lats))?
            .assign(LONGITUDE, Column::Float(lons))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn round_trip(projection: Projection) {
        for (lon, lat) in [(-73.81, 40.64), (2.81, 49.0), (-30.0, 52.5), (10.0, 45.0)] {
            let (x, y) = projection.forward(lon, lat);
            let (lon2, lat2) = projection.inverse(x, y);
            assert_relative_eq!(lon, lon2, epsilon = 1e-7);
            assert_relative_eq!(lat, lat2, epsilon = 1e-7);
        }
    }

    #[test]
    fn inverses() {
        for kind in [ProjectionKind::Lcc, ProjectionKind::Aea, ProjectionKind::Merc] {
            round_trip(Projection {
                kind,
                lat_0: 45.0,
                lon_0: -35.0,
                lat_1: 40.64,
                lat_2: 49.0,
            });
        }
        // Standard parallels on the equator
        round_trip(Projection {
            kind: ProjectionKind::Lcc,
            lat_0: 0.0,
            lon_0: 0.0,
            lat_1: 0.0,
            lat_2: 0.0,
        });
    }

    #[test]
    fn origin_maps_near_zero() {
        let p = Projection {
            kind: ProjectionKind::Lcc,
            lat_0: 45.0,
            lon_0: 2.0,
            lat_1: 44.0,
            lat_2: 46.0,
        };
        let (x, y) = p.forward(2.0, 45.0);
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
        // One degree of latitude is about 111 km
        let (_, y) = p.forward(2.0, 46.0);
        assert!((y - 111_000.0).abs() < 1_000.0);
        assert!("utm".parse::<ProjectionKind>().is_err());
    }
}
