//! Optional collaborators, like something to draw trajectories with. Without one registered, asking
//! for it is an `Unsupported` error.

use crate::io::to_geojson_collection;
use crate::trajectory::Trajectory;
use crate::{Error, Result};

pub trait Renderer {
    fn name(&self) -> &str;
    fn render(&self, trajectories: &[&Trajectory]) -> Result<String>;
}

/// Draws nothing, but describes the paths as a GeoJSON `FeatureCollection` for something else to
/// draw.
pub struct GeoJsonRenderer {
    pub pretty: bool,
}

impl Renderer for GeoJsonRenderer {
    fn name(&self) -> &str {
        "geojson"
    }

    fn render(&self, trajectories: &[&Trajectory]) -> Result<String> {
        let gj = to_geojson_collection(trajectories.iter().copied())?;
        let json = if self.pretty {
            serde_json::to_string_pretty(&gj)
        } else {
            serde_json::to_string(&gj)
        };
        json.map_err(|err| Error::invalid(format!("can't serialize GeoJSON: {err}")))
    }
}

#[derive(Default)]
pub struct Capabilities {
    renderer: Option<Box<dyn Renderer>>,
}

impl Capabilities {
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.register_renderer(renderer);
        self
    }

    pub fn register_renderer(&mut self, renderer: Box<dyn Renderer>) {
        info!("Rendering with {}", renderer.name());
        self.renderer = Some(renderer);
    }

    pub fn render(&self, trajectories: &[&Trajectory]) -> Result<String> {
        match &self.renderer {
            Some(renderer) => renderer.render(trajectories),
            None => Err(Error::Unsupported(
                "no renderer registered; register one with Capabilities::register_renderer".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::tests::flight;

    #[test]
    fn unregistered() {
        let f = flight(&[0, 1, 2]);
        assert!(matches!(
            Capabilities::default().render(&[&f]),
            Err(Error::Unsupported(_))
        ));
        let caps = Capabilities::default().with_renderer(Box::new(GeoJsonRenderer { pretty: false }));
        let json = caps.render(&[&f]).unwrap();
        assert!(json.contains("FeatureCollection"));
        assert!(json.contains("LineString"));
    }
}
