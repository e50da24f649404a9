use std::fmt;
use std::rc::Rc;

use crate::interval::{IntervalCollection, TimeSpan};
use crate::table::{Column, Value};
use crate::template::{render, Context};
use crate::trajectory::Trajectory;
use crate::{Error, Result};

type Producer = Rc<dyn Fn() -> Box<dyn Iterator<Item = Trajectory>>>;

/// A lazy sequence of sub-trajectories, as produced by splitting, windowing, clipping or any
/// detector.
///
/// Iterating never consumes anything: each call to `iter` re-runs the producer from scratch, so the
/// same `Segments` can be walked any number of times, independently.
#[derive(Clone)]
pub struct Segments {
    // Where these came from, for logs and labels
    name: String,
    producer: Producer,
}

impl fmt::Debug for Segments {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Segments({})", self.name)
    }
}

impl Segments {
    pub fn new<I, F>(name: impl Into<String>, producer: F) -> Self
    where
        I: Iterator<Item = Trajectory> + 'static,
        F: Fn() -> I + 'static,
    {
        Self {
            name: name.into(),
            producer: Rc::new(move || {
                Box::new(producer()) as Box<dyn Iterator<Item = Trajectory>>
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new("empty", std::iter::empty::<Trajectory>)
    }

    pub fn from_vec(name: impl Into<String>, segments: Vec<Trajectory>) -> Self {
        Self::new(name, move || segments.clone().into_iter())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A fresh pass over the segments.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Trajectory>> {
        (self.producer)()
    }

    pub fn has(&self) -> bool {
        self.iter().next().is_some()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Option<Trajectory> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<Trajectory> {
        self.iter().last()
    }

    pub fn collect(&self) -> Vec<Trajectory> {
        self.iter().collect()
    }

    /// The segment with the largest key. Ties go to the earliest segment.
    pub fn max_by_key<K: PartialOrd>(&self, key: impl Fn(&Trajectory) -> K) -> Option<Trajectory> {
        let mut best: Option<(K, Trajectory)> = None;
        for segment in self.iter() {
            let k = key(&segment);
            if best.as_ref().map_or(true, |(b, _)| k > *b) {
                best = Some((k, segment));
            }
        }
        best.map(|(_, segment)| segment)
    }

    /// The segment with the smallest key. Ties go to the earliest segment.
    pub fn min_by_key<K: PartialOrd>(&self, key: impl Fn(&Trajectory) -> K) -> Option<Trajectory> {
        let mut best: Option<(K, Trajectory)> = None;
        for segment in self.iter() {
            let k = key(&segment);
            if best.as_ref().map_or(true, |(b, _)| k < *b) {
                best = Some((k, segment));
            }
        }
        best.map(|(_, segment)| segment)
    }

    /// The segment with the largest value of a property, like `duration`.
    pub fn max(&self, property: &str) -> Result<Option<Trajectory>> {
        self.extreme(property, std::cmp::Ordering::Greater)
    }

    pub fn min(&self, property: &str) -> Result<Option<Trajectory>> {
        self.extreme(property, std::cmp::Ordering::Less)
    }

    fn extreme(&self, property: &str, wins: std::cmp::Ordering) -> Result<Option<Trajectory>> {
        let mut best: Option<(Value, Trajectory)> = None;
        for segment in self.iter() {
            let value = segment.property(property)?;
            if value.is_null() {
                continue;
            }
            let better = match &best {
                None => true,
                Some((b, _)) => value.compare(b) == Some(wins),
            };
            if better {
                best = Some((value, segment));
            }
        }
        Ok(best.map(|(_, segment)| segment))
    }

    /// Concatenates every segment into one trajectory, or `None` if there are none.
    ///
    /// Each segment is tagged first: with a `flight_id` rendered from the template (with `{i}` and
    /// `{self.<property>}` placeholders), or otherwise with its position in an `index_` column.
    pub fn all(&self, flight_id: Option<&str>) -> Result<Option<Trajectory>> {
        let mut tagged = Vec::new();
        for (idx, segment) in self.iter().enumerate() {
            let segment = match flight_id {
                Some(template) => {
                    let id = render(template, &Context::new(idx, &segment))?;
                    segment.assign_value("flight_id", id)?
                }
                None => segment.assign_value("index_", idx)?,
            };
            tagged.push(segment);
        }
        if tagged.is_empty() {
            return Ok(None);
        }
        let refs: Vec<&Trajectory> = tagged.iter().collect();
        Trajectory::concat(&refs).map(Some)
    }

    /// Lazily transforms each segment, dropping the ones mapped to `None`.
    pub fn map<F>(&self, f: F) -> Segments
    where
        F: Fn(Trajectory) -> Option<Trajectory> + 'static,
    {
        let inner = self.producer.clone();
        let f = Rc::new(f);
        Segments::new(format!("{}.map", self.name), move || {
            let f = f.clone();
            inner().filter_map(move |segment| f(segment))
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Segments
    where
        F: Fn(&Trajectory) -> bool + 'static,
    {
        let inner = self.producer.clone();
        let predicate = Rc::new(predicate);
        Segments::new(format!("{}.filter", self.name), move || {
            let predicate = predicate.clone();
            inner().filter(move |segment| predicate(segment))
        })
    }

    /// Writes per-segment values into the rows of `original` covered by each segment, boundaries
    /// included.
    ///
    /// Every field starts out as `false` when its value is the literal `true`, and null otherwise.
    /// Later segments overwrite earlier ones where they overlap.
    pub fn label(&self, original: &Trajectory, fields: &[(&str, LabelValue)]) -> Result<Trajectory> {
        let times = original.times();
        let mut columns: Vec<Vec<Value>> = fields
            .iter()
            .map(|(_, value)| vec![value.default_value(); times.len()])
            .collect();

        for (idx, segment) in self.iter().enumerate() {
            let covered: Vec<usize> = times
                .iter()
                .enumerate()
                .filter(|(_, t)| segment.start() <= **t && **t <= segment.stop())
                .map(|(row, _)| row)
                .collect();
            if covered.is_empty() {
                continue;
            }
            for ((_, label), column) in fields.iter().zip(columns.iter_mut()) {
                let value = label.evaluate(idx, &segment, original)?;
                for row in &covered {
                    column[*row] = value.clone();
                }
            }
        }

        let mut result = original.clone();
        for ((name, _), values) in fields.iter().zip(columns) {
            result = result.assign(name, Column::from_values(&values))?;
        }
        Ok(result)
    }
}

impl TimeSpan for Segments {
    fn intervals(&self) -> IntervalCollection {
        self.iter().map(|segment| segment.interval()).collect()
    }
}

impl IntoIterator for &Segments {
    type Item = Trajectory;
    type IntoIter = Box<dyn Iterator<Item = Trajectory>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// How `label` computes the value of one field for one segment.
#[derive(Clone)]
pub enum LabelValue {
    Literal(Value),
    /// Rendered with `{i}`, `{segment.<property>}` and `{self.<property>}`, where `self` is the
    /// labelled trajectory
    Template(String),
    Segment(Rc<dyn Fn(&Trajectory) -> Value>),
    /// Gets the segment's index too
    Indexed(Rc<dyn Fn(usize, &Trajectory) -> Value>),
    /// Gets the index, the segment and the labelled trajectory
    Full(Rc<dyn Fn(usize, &Trajectory, &Trajectory) -> Value>),
}

impl LabelValue {
    pub fn segment(f: impl Fn(&Trajectory) -> Value + 'static) -> Self {
        LabelValue::Segment(Rc::new(f))
    }

    pub fn indexed(f: impl Fn(usize, &Trajectory) -> Value + 'static) -> Self {
        LabelValue::Indexed(Rc::new(f))
    }

    pub fn full(f: impl Fn(usize, &Trajectory, &Trajectory) -> Value + 'static) -> Self {
        LabelValue::Full(Rc::new(f))
    }

    fn default_value(&self) -> Value {
        match self {
            LabelValue::Literal(Value::Bool(true)) => Value::Bool(false),
            _ => Value::Null,
        }
    }

    fn evaluate(&self, idx: usize, segment: &Trajectory, original: &Trajectory) -> Result<Value> {
        Ok(match self {
            LabelValue::Literal(value) => value.clone(),
            LabelValue::Template(template) => Value::Text(render(
                template,
                &Context::new(idx, original).with_segment(segment),
            )?),
            LabelValue::Segment(f) => f(segment),
            LabelValue::Indexed(f) => f(idx, segment),
            LabelValue::Full(f) => f(idx, segment, original),
        })
    }
}

impl From<Value> for LabelValue {
    fn from(value: Value) -> Self {
        LabelValue::Literal(value)
    }
}

macro_rules! literal_label {
    ($($t:ty),*) => {
        $(
            impl From<$t> for LabelValue {
                fn from(value: $t) -> Self {
                    LabelValue::Literal(value.into())
                }
            }
        )*
    };
}

literal_label!(bool, i64, usize, f64, &str, String);

impl fmt::Debug for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LabelValue::Literal(value) => write!(f, "Literal({value:?})"),
            LabelValue::Template(template) => write!(f, "Template({template:?})"),
            LabelValue::Segment(_) => write!(f, "Segment(fn)"),
            LabelValue::Indexed(_) => write!(f, "Indexed(fn)"),
            LabelValue::Full(_) => write!(f, "Full(fn)"),
        }
    }
}

/// Parses `name=value` label fields from the command line or a config: `true`/`false`, numbers,
/// and anything with `{` as a template, everything else as literal text.
pub fn parse_label_field(input: &str) -> Result<(String, LabelValue)> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| Error::parse(format!("expected name=value, not {input:?}")))?;
    let value = value.trim();
    let label = if value.contains('{') {
        LabelValue::Template(value.to_string())
    } else if let Ok(b) = value.parse::<bool>() {
        b.into()
    } else if let Ok(x) = value.parse::<i64>() {
        x.into()
    } else if let Ok(x) = value.parse::<f64>() {
        x.into()
    } else {
        value.into()
    };
    Ok((name.trim().to_string(), label))
}
