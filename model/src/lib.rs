//! Slicing, splitting, resampling and clipping aircraft trajectories.

#[macro_use]
extern crate log;

mod capability;
mod clip;
mod detector;
mod error;
mod expr;
mod features;
mod interval;
pub mod io;
mod projection;
mod resample;
mod segments;
mod split;
mod table;
mod template;
pub mod time;
mod traffic;
mod trajectory;

pub use self::capability::{Capabilities, GeoJsonRenderer, Renderer};
pub use self::clip::{inside_windows, Located, Shape};
pub use self::detector::{Clip, Enricher, EventDetector, Extractor, Kinematics, Matching, Wind};
pub use self::error::{Error, Result};
pub use self::expr::{Call, IntoMethod, Literal, Method, Predicate, Registry};
pub use self::features::{bearing, distance_nm, Agg, Closest};
pub use self::interval::{Interval, IntervalCollection, TimeSpan};
pub use self::projection::{Projection, ProjectionKind};
pub use self::resample::{
    FillMethod, How, Interpolation, PlanarProjection, ResampleOptions, ResampleRule,
    ANGLE_FEATURES,
};
pub use self::segments::{parse_label_field, LabelValue, Segments};
pub use self::split::Gap;
pub use self::table::{Column, DType, Row, Table, Value};
pub use self::template::{render, Context};
pub use self::time::Time;
pub use self::traffic::Traffic;
pub use self::trajectory::{Position, TimeBound, Trajectory, Unique, LATITUDE, LONGITUDE, TIMESTAMP};
