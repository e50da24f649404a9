#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use anyhow::Result;
use structopt::StructOpt;

use flight_model::io::{read_csv, read_shapes, read_trajectory, write_csv};
use flight_model::time::format_duration;
use flight_model::{
    parse_label_field, Capabilities, FillMethod, GeoJsonRenderer, Gap, How, LabelValue,
    PlanarProjection, Predicate, ProjectionKind, Registry, ResampleOptions, Segments, Table,
    Traffic, Trajectory,
};

#[derive(StructOpt)]
#[structopt(name = "flight-cli", about = "Slice, split, resample and clip trajectories")]
enum Command {
    /// Summarizes each trajectory in a CSV file
    Info {
        input: String,
        /// Group rows into several trajectories by this column, like icao24
        #[structopt(long)]
        key: Option<String>,
    },
    /// Splits a trajectory wherever samples are too far apart, writing one CSV per segment
    Split {
        input: String,
        #[structopt(long, default_value = "10 min")]
        gap: Gap,
        /// Only keep segments passing this test, like "longer_than('5 min')"
        #[structopt(long)]
        filter: Option<String>,
        /// Where to write segment_000.csv and so on. Without it, just counts.
        #[structopt(long)]
        out_dir: Option<String>,
    },
    /// Resamples at a rate like "1s", or to a number of samples like "100"
    Resample {
        input: String,
        #[structopt(long, default_value = "1s")]
        rule: String,
        /// interpolate, ffill, bfill or nearest
        #[structopt(long, default_value = "interpolate")]
        how: FillMethod,
        /// Interpolate positions in lcc, aea or merc, centered on the trajectory
        #[structopt(long)]
        projection: Option<ProjectionKind>,
        #[structopt(long)]
        out: Option<String>,
    },
    /// Keeps the part of a trajectory inside the polygons of a GeoJSON file
    Clip {
        input: String,
        #[structopt(long)]
        shape: String,
        /// One CSV per visit inside the shape, in --out-dir
        #[structopt(long)]
        iterate: bool,
        #[structopt(long)]
        out: Option<String>,
        #[structopt(long)]
        out_dir: Option<String>,
    },
    /// Writes per-segment values into the rows each segment covers
    Label {
        input: String,
        /// Where segments come from, like "split('1 min')" or "sliding_windows('5 min', '1 min')"
        #[structopt(long)]
        method: String,
        /// name=value, where the value is a literal or a template like "{segment.start}"
        #[structopt(long = "field")]
        fields: Vec<String>,
        #[structopt(long)]
        out: Option<String>,
    },
    /// Describes the paths as GeoJSON
    Render {
        inputs: Vec<String>,
        #[structopt(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Command::from_args() {
        Command::Info { input, key } => info(&input, key),
        Command::Split {
            input,
            gap,
            filter,
            out_dir,
        } => split(&input, gap, filter, out_dir),
        Command::Resample {
            input,
            rule,
            how,
            projection,
            out,
        } => {
            let options = ResampleOptions {
                how: How::All(how),
                projection: projection.map(PlanarProjection::Centered),
                ..ResampleOptions::new(rule.parse::<flight_model::ResampleRule>()?)
            };
            let resampled = load(&input)?.resample_with(&options)?;
            write_table(resampled.data(), out)
        }
        Command::Clip {
            input,
            shape,
            iterate,
            out,
            out_dir,
        } => clip(&input, &shape, iterate, out, out_dir),
        Command::Label {
            input,
            method,
            fields,
            out,
        } => {
            let fields = fields
                .iter()
                .map(|f| parse_label_field(f))
                .collect::<flight_model::Result<Vec<(String, LabelValue)>>>()?;
            if fields.is_empty() {
                bail!("Pass at least one --field name=value");
            }
            let fields: Vec<(&str, LabelValue)> = fields
                .iter()
                .map(|(name, value)| (name.as_str(), value.clone()))
                .collect();
            let method = Registry::default().resolve(&method)?;
            let labelled = load(&input)?.label(&method, &fields)?;
            write_table(labelled.data(), out)
        }
        Command::Render { inputs, pretty } => {
            let mut trajectories = Vec::new();
            for input in inputs {
                trajectories.push(load(&input)?);
            }
            let refs: Vec<&Trajectory> = trajectories.iter().collect();
            let caps = Capabilities::default().with_renderer(Box::new(GeoJsonRenderer { pretty }));
            println!("{}", caps.render(&refs)?);
            Ok(())
        }
    }
}

fn load(path: &str) -> Result<Trajectory> {
    Ok(read_trajectory(fs_err::File::open(path)?)?)
}

fn write_table(table: &Table, out: Option<String>) -> Result<()> {
    match out {
        Some(path) => {
            write_csv(table, fs_err::File::create(&path)?)?;
            info!("Wrote {} rows to {path}", table.len());
        }
        None => write_csv(table, std::io::stdout())?,
    }
    Ok(())
}

fn write_segments(segments: &Segments, out_dir: Option<String>) -> Result<()> {
    let Some(dir) = out_dir else {
        println!("{} segments", segments.count());
        return Ok(());
    };
    fs_err::create_dir_all(&dir)?;
    for (idx, segment) in segments.iter().enumerate() {
        write_table(segment.data(), Some(format!("{dir}/segment_{idx:03}.csv")))?;
    }
    Ok(())
}

fn info(input: &str, key: Option<String>) -> Result<()> {
    let traffic = match key {
        Some(key) => Traffic::from_table(&read_csv(fs_err::File::open(input)?)?, &key)?,
        None => Traffic::new(vec![load(input)?]),
    };
    for flight in &traffic {
        println!("{}", flight.title());
        println!("  from {} to {}", flight.start(), flight.stop());
        println!("  duration {}", format_duration(flight.duration()));
        println!("  {} samples", flight.len());
        for field in ["icao24", "callsign", "registration", "typecode", "origin", "destination"] {
            if let Some(value) = flight.unique(field).one() {
                println!("  {field}: {value}");
            }
        }
        if let (Some(min), Some(max)) = (flight.min("altitude"), flight.max("altitude")) {
            println!("  altitude between {min} and {max}");
        }
        if let Some(distance) = flight.distance() {
            println!("  {distance:.1} nm between the first and last positions");
        }
    }
    Ok(())
}

fn split(input: &str, gap: Gap, filter: Option<String>, out_dir: Option<String>) -> Result<()> {
    let mut segments = load(input)?.split(gap);
    if let Some(filter) = filter {
        let predicate: Predicate = filter.parse()?;
        segments = segments.filter(move |segment| match predicate.evaluate(segment) {
            Ok(keep) => keep,
            Err(err) => {
                warn!("Skipping {}: {err}", segment.title());
                false
            }
        });
    }
    write_segments(&segments, out_dir)
}

fn clip(
    input: &str,
    shape: &str,
    iterate: bool,
    out: Option<String>,
    out_dir: Option<String>,
) -> Result<()> {
    let shape = read_shapes(&fs_err::read_to_string(shape)?)?;
    let flight = load(input)?;
    if iterate {
        if out.is_some() {
            bail!("--iterate writes one file per visit; use --out-dir instead of --out");
        }
        return write_segments(&flight.clip_iterate(&shape)?, out_dir);
    }
    match flight.clip(&shape)? {
        Some(clipped) => write_table(clipped.data(), out),
        None => bail!("{} never enters the shape", flight.title()),
    }
}
