//! The narrow shapes plug-in algorithms take. Whatever finds holding patterns, go-arounds or
//! flight phases only has to implement one of these; nothing here looks inside them.

use crate::clip::Shape;
use crate::resample::ResampleOptions;
use crate::segments::Segments;
use crate::split::Gap;
use crate::table::Row;
use crate::trajectory::Trajectory;
use crate::Result;

/// Finds any number of events in a trajectory.
pub trait EventDetector {
    /// Used to name the produced segments
    fn name(&self) -> &str;
    fn apply(&self, trajectory: &Trajectory) -> Result<Segments>;
}

/// Adds or rewrites columns.
pub trait Enricher {
    fn apply(&self, trajectory: &Trajectory) -> Result<Trajectory>;
}

/// Keeps at most one part of a trajectory.
pub trait Extractor {
    fn apply(&self, trajectory: &Trajectory) -> Result<Option<Trajectory>>;
}

impl<F> Enricher for F
where
    F: Fn(&Trajectory) -> Result<Trajectory>,
{
    fn apply(&self, trajectory: &Trajectory) -> Result<Trajectory> {
        self(trajectory)
    }
}

impl<F> Extractor for F
where
    F: Fn(&Trajectory) -> Option<Trajectory>,
{
    fn apply(&self, trajectory: &Trajectory) -> Result<Option<Trajectory>> {
        Ok(self(trajectory))
    }
}

impl Enricher for ResampleOptions {
    fn apply(&self, trajectory: &Trajectory) -> Result<Trajectory> {
        trajectory.resample_with(self)
    }
}

/// Episodes where rows match a predicate, split apart by gaps.
pub struct Matching<F> {
    pub name: String,
    pub gap: Gap,
    pub predicate: F,
}

impl<F: Fn(&Row<'_>) -> bool> Matching<F> {
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            gap: Gap::default(),
            predicate,
        }
    }
}

impl<F: Fn(&Row<'_>) -> bool> EventDetector for Matching<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, trajectory: &Trajectory) -> Result<Segments> {
        Ok(match trajectory.query(&self.predicate) {
            Some(matching) => matching.split(self.gap).named(self.name.clone()),
            None => Segments::empty().named(self.name.clone()),
        })
    }
}

/// The part of the trajectory from first entry into a region to the last exit.
pub struct Clip<S>(pub S);

impl<S: Shape> Extractor for Clip<S> {
    fn apply(&self, trajectory: &Trajectory) -> Result<Option<Trajectory>> {
        trajectory.clip(&self.0)
    }
}

/// Great-circle distance flown, ground speed and track from consecutive positions.
pub struct Kinematics;

impl Enricher for Kinematics {
    fn apply(&self, trajectory: &Trajectory) -> Result<Trajectory> {
        trajectory.cumulative_distance(true, true, false)
    }
}

/// Wind from the ground and air vectors.
pub struct Wind;

impl Enricher for Wind {
    fn apply(&self, trajectory: &Trajectory) -> Result<Trajectory> {
        trajectory.compute_wind()
    }
}

impl Trajectory {
    pub fn detect(&self, detector: &dyn EventDetector) -> Result<Segments> {
        let segments = detector.apply(self)?;
        debug!("{} on {}", detector.name(), self.title());
        Ok(segments)
    }

    pub fn enrich(&self, enricher: &dyn Enricher) -> Result<Trajectory> {
        enricher.apply(self)
    }

    pub fn extract(&self, extractor: &dyn Extractor) -> Result<Option<Trajectory>> {
        extractor.apply(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::table::Column;
    use crate::trajectory::tests::flight;

    #[test]
    fn matching_rows() {
        let f = flight(&[0, 1, 2, 3, 4, 2000, 2001])
            .assign(
                "altitude",
                Column::floats(vec![100.0, 9000.0, 9500.0, 200.0, 100.0, 9000.0, 9000.0]),
            )
            .unwrap();
        let high = Matching::new("high", |row: &Row<'_>| {
            row.f64("altitude").map_or(false, |alt| alt > 5000.0)
        });
        let segments = f.detect(&high).unwrap();
        assert_eq!(segments.name(), "high");
        let sizes: Vec<usize> = segments.iter().map(|s| s.data().len()).collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn closures_plug_in() {
        let f = flight(&[0, 60, 120]);
        let first_minute = |t: &Trajectory| t.first(Duration::minutes(1));
        assert_eq!(f.extract(&first_minute).unwrap().unwrap().data().len(), 1);
        let tagged = |t: &Trajectory| t.assign_value("tag", true);
        assert!(f.enrich(&tagged).unwrap().has("tag"));
        assert!(f.enrich(&Kinematics).unwrap().has("cumdist"));
        assert!(f.enrich(&Wind).is_err());
        let resampled = f.enrich(&ResampleOptions::new(Duration::seconds(30))).unwrap();
        assert_eq!(resampled.data().len(), 5);
    }
}
