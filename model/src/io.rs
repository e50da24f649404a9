//! Reading and writing trajectories: CSV tables in, CSV and GeoJSON out, GeoJSON polygons as clip
//! regions.

use std::io::{Read, Write};

use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson};

use crate::table::{Column, Table};
use crate::time::{format_time, parse_time};
use crate::traffic::Traffic;
use crate::trajectory::Trajectory;
use crate::{Error, Result};

// Reported in the GeoJSON properties when present
const IDENTITY_FIELDS: [&str; 7] = [
    "callsign",
    "icao24",
    "flight_id",
    "number",
    "origin",
    "destination",
    "registration",
];

/// Reads a table with a header row. Each column gets the narrowest type that fits every non-empty
/// cell: integers, floats, booleans, timestamps, then text. Empty cells are null.
pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for rec in reader.records() {
        let rec = rec?;
        for (idx, column) in cells.iter_mut().enumerate() {
            let cell = rec.get(idx).unwrap_or("").trim();
            column.push((!cell.is_empty()).then(|| cell.to_string()));
        }
    }

    let mut columns = Vec::new();
    for (name, raw) in headers.into_iter().zip(cells) {
        let column = infer_column(&name, raw);
        columns.push((name, column));
    }
    let table = Table::new(columns)?;
    debug!("Read {} rows, columns {:?}", table.len(), table.names().collect::<Vec<_>>());
    Ok(table)
}

fn infer_column(name: &str, raw: Vec<Option<String>>) -> Column {
    let present = || raw.iter().flatten();

    // Timestamp columns may well be epoch seconds, which would otherwise look like numbers
    let time_named = name == "timestamp" || name == "last_position";
    let looks_like_time = |s: &String| {
        time_named || ((s.contains('-') || s.contains(':')) && s.parse::<f64>().is_err())
    };
    if present().all(|s| looks_like_time(s) && parse_time(s).is_ok()) && present().next().is_some() {
        return Column::Time(
            raw.iter()
                .map(|cell| cell.as_ref().and_then(|s| parse_time(s).ok()))
                .collect(),
        );
    }
    if present().all(|s| s.parse::<i64>().is_ok()) {
        return Column::Int(
            raw.iter()
                .map(|cell| cell.as_ref().and_then(|s| s.parse().ok()))
                .collect(),
        );
    }
    if present().all(|s| s.parse::<f64>().is_ok()) {
        return Column::Float(
            raw.iter()
                .map(|cell| cell.as_ref().and_then(|s| s.parse().ok()))
                .collect(),
        );
    }
    let as_bool = |s: &str| match s.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    };
    if present().all(|s| as_bool(s).is_some()) {
        return Column::Bool(
            raw.iter()
                .map(|cell| cell.as_deref().and_then(as_bool))
                .collect(),
        );
    }
    Column::Text(raw)
}

pub fn read_trajectory<R: Read>(reader: R) -> Result<Trajectory> {
    Ok(Trajectory::new(read_csv(reader)?)?.sort_by_time())
}

/// One trajectory per distinct value of `key`.
pub fn read_traffic<R: Read>(reader: R, key: &str) -> Result<Traffic> {
    Traffic::from_table(&read_csv(reader)?, key)
}

/// Writes a header row, then one record per row. Nulls are empty cells.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table.names())?;
    for row in table.rows() {
        let record: Vec<String> = table
            .names()
            .map(|name| row.get(name).to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// The path as a `LineString` feature, with the identity of the flight, its bounds in time and its
/// number of samples as properties.
pub fn to_geojson(trajectory: &Trajectory) -> Result<Feature> {
    let line = trajectory
        .linestring()
        .ok_or_else(|| Error::invalid("need at least two positions to draw a path"))?;
    let mut feature = Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&line))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    for field in IDENTITY_FIELDS {
        if let Some(value) = trajectory.unique(field).one() {
            feature.set_property(field, value.to_string());
        }
    }
    feature.set_property("start", format_time(trajectory.start()));
    feature.set_property("stop", format_time(trajectory.stop()));
    feature.set_property("samples", trajectory.len());
    Ok(feature)
}

pub fn to_geojson_collection<'a>(
    trajectories: impl IntoIterator<Item = &'a Trajectory>,
) -> Result<GeoJson> {
    let mut features = Vec::new();
    for trajectory in trajectories {
        features.push(to_geojson(trajectory)?);
    }
    Ok(GeoJson::FeatureCollection(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    }))
}

/// Every polygon in a GeoJSON document, as one region. Other geometries are skipped.
pub fn read_shapes(input: &str) -> Result<MultiPolygon<f64>> {
    let gj: GeoJson = input.parse()?;
    let geometries: Vec<geojson::Geometry> = match gj {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        match Geometry::<f64>::try_from(geometry)? {
            Geometry::Polygon(polygon) => polygons.push(polygon),
            Geometry::MultiPolygon(multi) => polygons.extend(multi),
            other => warn!("Ignoring a non-polygon geometry: {other:?}"),
        }
    }
    if polygons.is_empty() {
        return Err(Error::invalid("no polygon in the GeoJSON input"));
    }
    Ok(MultiPolygon::new(polygons))
}
