//! A small closed language to pick segment sources and predicates from strings, like
//! `split('10 min')`, `sliding_windows('5 min', '1 min')` or `longer_than('2 min')`.
//!
//! Only a call to a known name with literal arguments (quoted text, numbers, `true`/`false`) is
//! accepted; nothing else is evaluated.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use chrono::Duration;
use geo::MultiPolygon;

use crate::detector::EventDetector;
use crate::segments::{LabelValue, Segments};
use crate::split::Gap;
use crate::table::Value;
use crate::time::{format_duration, parse_duration};
use crate::trajectory::Trajectory;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Value {
        match literal {
            Literal::Text(s) => Value::Text(s),
            Literal::Number(x) if x.fract() == 0.0 && x.abs() < 1e15 => Value::Int(x as i64),
            Literal::Number(x) => Value::Float(x),
            Literal::Bool(b) => Value::Bool(b),
        }
    }
}

/// `name(arg, ...)`. The parentheses can be left out when there are no arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Literal>,
}

impl FromStr for Call {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut parser = Parser {
            input,
            chars: input.chars().collect(),
            pos: 0,
        };
        let call = parser.call()?;
        parser.skip_whitespace();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected input after the call"));
        }
        Ok(call)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> Error {
        Error::parse(format!("{msg} at position {} of {:?}", self.pos, self.input))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).cloned()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn call(&mut self) -> Result<Call> {
        self.skip_whitespace();
        let name = self.identifier()?;
        let mut args = Vec::new();
        if self.eat('(') {
            if !self.eat(')') {
                loop {
                    args.push(self.literal()?);
                    if self.eat(')') {
                        break;
                    }
                    if !self.eat(',') {
                        return Err(self.error("expected , or )"));
                    }
                }
            }
        }
        Ok(Call { name, args })
    }

    fn identifier(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        if start == self.pos || self.chars[start].is_ascii_digit() {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn literal(&mut self) -> Result<Literal> {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().map_or(false, |c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unclosed string"));
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(Literal::Text(text))
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = self.pos;
                while self
                    .peek()
                    .map_or(false, |c| c.is_ascii_digit() || "+-.eE".contains(c))
                {
                    self.pos += 1;
                }
                let number: String = self.chars[start..self.pos].iter().collect();
                number
                    .parse()
                    .map(Literal::Number)
                    .map_err(|_| self.error("bad number"))
            }
            Some(_) => match self.identifier()?.as_str() {
                "true" | "True" => Ok(Literal::Bool(true)),
                "false" | "False" => Ok(Literal::Bool(false)),
                _ => Err(self.error("only text, numbers and booleans can be arguments")),
            },
            None => Err(self.error("expected an argument")),
        }
    }
}

fn text_arg<'a>(call: &'a Call, idx: usize) -> Result<&'a str> {
    match call.args.get(idx) {
        Some(Literal::Text(s)) => Ok(s.as_str()),
        other => Err(Error::invalid(format!(
            "argument {} of {} should be text, not {other:?}",
            idx + 1,
            call.name
        ))),
    }
}

fn duration_arg(call: &Call, idx: usize) -> Result<Duration> {
    parse_duration(text_arg(call, idx)?)
}

fn strict_arg(call: &Call, idx: usize) -> Result<bool> {
    match call.args.get(idx) {
        None => Ok(true),
        Some(Literal::Bool(b)) => Ok(*b),
        Some(other) => Err(Error::invalid(format!(
            "strict should be true or false in {}, not {other:?}",
            call.name
        ))),
    }
}

fn arity(call: &Call, min: usize, max: usize) -> Result<()> {
    if call.args.len() < min || call.args.len() > max {
        return Err(Error::invalid(format!(
            "{} takes {min} to {max} arguments, not {}",
            call.name,
            call.args.len()
        )));
    }
    Ok(())
}

/// Where segments come from.
#[derive(Clone)]
pub enum Method {
    Split(Gap),
    SlidingWindows { duration: Duration, step: Duration },
    ClipIterate(MultiPolygon<f64>),
    Emergency,
    Detector(Rc<dyn EventDetector>),
}

impl Method {
    pub fn apply(&self, trajectory: &Trajectory) -> Result<Segments> {
        match self {
            Method::Split(gap) => Ok(trajectory.split(*gap)),
            Method::SlidingWindows { duration, step } => {
                trajectory.sliding_windows(*duration, *step)
            }
            Method::ClipIterate(shape) => trajectory.clip_iterate(shape),
            Method::Emergency => Ok(trajectory.emergency()),
            Method::Detector(detector) => trajectory.detect(detector.as_ref()),
        }
    }

    fn from_call(call: &Call) -> Result<Self> {
        match call.name.as_str() {
            "split" => {
                arity(call, 0, 2)?;
                let gap = match call.args.as_slice() {
                    [] => Gap::default(),
                    [Literal::Text(s)] => s.parse()?,
                    [Literal::Number(x)] if x.fract() == 0.0 => Gap::from_unit(*x as i64, "m")?,
                    [Literal::Number(x), Literal::Text(unit)] if x.fract() == 0.0 => {
                        Gap::from_unit(*x as i64, unit)?
                    }
                    _ => {
                        return Err(Error::invalid(format!(
                            "split takes a duration like '10 min', or a whole number and a unit, not {:?}",
                            call.args
                        )))
                    }
                };
                Ok(Method::Split(gap))
            }
            "sliding_windows" => {
                arity(call, 2, 2)?;
                Ok(Method::SlidingWindows {
                    duration: duration_arg(call, 0)?,
                    step: duration_arg(call, 1)?,
                })
            }
            "emergency" => {
                arity(call, 0, 0)?;
                Ok(Method::Emergency)
            }
            "clip_iterate" => Err(Error::invalid(
                "clip_iterate needs a shape, so build Method::ClipIterate directly",
            )),
            name => Err(Error::parse(format!("unknown segment source {name:?}"))),
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::from_call(&s.parse()?)
    }
}

impl From<Gap> for Method {
    fn from(gap: Gap) -> Self {
        Method::Split(gap)
    }
}

impl From<Rc<dyn EventDetector>> for Method {
    fn from(detector: Rc<dyn EventDetector>) -> Self {
        Method::Detector(detector)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Split(gap) => write!(f, "split('{gap}')"),
            Method::SlidingWindows { duration, step } => write!(
                f,
                "sliding_windows('{}', '{}')",
                format_duration(*duration),
                format_duration(*step)
            ),
            Method::ClipIterate(shape) => write!(f, "clip_iterate({} polygons)", shape.0.len()),
            Method::Emergency => write!(f, "emergency()"),
            Method::Detector(detector) => write!(f, "{}()", detector.name()),
        }
    }
}

/// Either shorthand or an already built method.
pub trait IntoMethod {
    fn into_method(self) -> Result<Method>;
}

impl IntoMethod for Method {
    fn into_method(self) -> Result<Method> {
        Ok(self)
    }
}

impl IntoMethod for &Method {
    fn into_method(self) -> Result<Method> {
        Ok(self.clone())
    }
}

impl IntoMethod for &str {
    fn into_method(self) -> Result<Method> {
        self.parse()
    }
}

impl IntoMethod for Rc<dyn EventDetector> {
    fn into_method(self) -> Result<Method> {
        Ok(Method::Detector(self))
    }
}

/// Named detectors that shorthand can refer to, on top of the built-in methods.
#[derive(Clone, Default)]
pub struct Registry {
    detectors: BTreeMap<String, Rc<dyn EventDetector>>,
}

impl Registry {
    pub fn register(&mut self, detector: Rc<dyn EventDetector>) {
        self.detectors.insert(detector.name().to_string(), detector);
    }

    pub fn resolve(&self, input: &str) -> Result<Method> {
        let call: Call = input.parse()?;
        match self.detectors.get(&call.name) {
            Some(detector) => {
                arity(&call, 0, 0)?;
                Ok(Method::Detector(detector.clone()))
            }
            None => Method::from_call(&call),
        }
    }
}

/// Tests on a whole trajectory, for filtering segments.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    LongerThan { duration: Duration, strict: bool },
    ShorterThan { duration: Duration, strict: bool },
    FeatureGt { feature: String, value: Value, strict: bool },
    FeatureLt { feature: String, value: Value, strict: bool },
}

impl Predicate {
    pub fn evaluate(&self, trajectory: &Trajectory) -> Result<bool> {
        match self {
            Predicate::LongerThan { duration, strict } => {
                Ok(trajectory.longer_than(*duration, *strict))
            }
            Predicate::ShorterThan { duration, strict } => {
                Ok(trajectory.shorter_than(*duration, *strict))
            }
            Predicate::FeatureGt {
                feature,
                value,
                strict,
            } => trajectory.feature_gt(feature, value.clone(), *strict),
            Predicate::FeatureLt {
                feature,
                value,
                strict,
            } => trajectory.feature_lt(feature, value.clone(), *strict),
        }
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let call: Call = s.parse()?;
        match call.name.as_str() {
            "longer_than" | "shorter_than" => {
                arity(&call, 1, 2)?;
                let duration = duration_arg(&call, 0)?;
                let strict = strict_arg(&call, 1)?;
                Ok(if call.name == "longer_than" {
                    Predicate::LongerThan { duration, strict }
                } else {
                    Predicate::ShorterThan { duration, strict }
                })
            }
            "feature_gt" | "feature_lt" => {
                arity(&call, 2, 3)?;
                let feature = text_arg(&call, 0)?.to_string();
                let value = match &call.args[1] {
                    // Durations compare against durations
                    Literal::Text(s) if feature == "duration" => Value::Duration(parse_duration(s)?),
                    other => other.clone().into(),
                };
                let strict = strict_arg(&call, 2)?;
                Ok(if call.name == "feature_gt" {
                    Predicate::FeatureGt {
                        feature,
                        value,
                        strict,
                    }
                } else {
                    Predicate::FeatureLt {
                        feature,
                        value,
                        strict,
                    }
                })
            }
            name => Err(Error::parse(format!("unknown predicate {name:?}"))),
        }
    }
}

impl Trajectory {
    pub fn segments(&self, method: impl IntoMethod) -> Result<Segments> {
        method.into_method()?.apply(self)
    }

    /// True if the method finds anything.
    pub fn has_segment(&self, method: impl IntoMethod) -> Result<bool> {
        Ok(self.segments(method)?.has())
    }

    pub fn count_segments(&self, method: impl IntoMethod) -> Result<usize> {
        Ok(self.segments(method)?.count())
    }

    pub fn next_segment(&self, method: impl IntoMethod) -> Result<Option<Trajectory>> {
        Ok(self.segments(method)?.next())
    }

    pub fn final_segment(&self, method: impl IntoMethod) -> Result<Option<Trajectory>> {
        Ok(self.segments(method)?.last())
    }

    pub fn all_segments(
        &self,
        method: impl IntoMethod,
        flight_id: Option<&str>,
    ) -> Result<Option<Trajectory>> {
        self.segments(method)?.all(flight_id)
    }

    /// Labels the rows of this trajectory covered by each segment the method finds.
    pub fn label(&self, method: impl IntoMethod, fields: &[(&str, LabelValue)]) -> Result<Trajectory> {
        self.segments(method)?.label(self, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Matching;
    use crate::table::Row;
    use crate::trajectory::tests::flight;

    #[test]
    fn calls() {
        let call: Call = " split ( '10 min' , 3, -1.5e1, true)".parse().unwrap();
        assert_eq!(call.name, "split");
        assert_eq!(
            call.args,
            vec![
                Literal::Text("10 min".to_string()),
                Literal::Number(3.0),
                Literal::Number(-15.0),
                Literal::Bool(true)
            ]
        );
        assert_eq!("emergency".parse::<Call>().unwrap().args, Vec::new());
        for bad in ["", "split(", "split('10 min'", "split(x)", "split() extra", "3split()"] {
            assert!(bad.parse::<Call>().is_err(), "{bad}");
        }
    }

    #[test]
    fn methods() {
        assert!(matches!(
            "split('10 min')".parse::<Method>().unwrap(),
            Method::Split(Gap(d)) if d == Duration::minutes(10)
        ));
        assert!(matches!(
            "split(5)".parse::<Method>().unwrap(),
            Method::Split(Gap(d)) if d == Duration::minutes(5)
        ));
        assert!(matches!(
            "split(30, 's')".parse::<Method>().unwrap(),
            Method::Split(Gap(d)) if d == Duration::seconds(30)
        ));
        assert!(matches!(
            "split()".parse::<Method>().unwrap(),
            Method::Split(gap) if gap == Gap::default()
        ));
        assert!(matches!(
            "sliding_windows('5 min', '1 min')".parse::<Method>().unwrap(),
            Method::SlidingWindows { .. }
        ));
        assert!("split(1.5)".parse::<Method>().is_err());
        assert!(matches!(
            "split(1e15)".parse::<Method>(),
            Err(Error::InvalidArgument(_))
        ));
        assert!("emergency(1)".parse::<Method>().is_err());
        assert!("holding_pattern()".parse::<Method>().is_err());
        assert!("clip_iterate()".parse::<Method>().is_err());
    }

    #[test]
    fn both_constructor_paths() {
        let f = flight(&[0, 1, 2, 10 * 60 + 3, 10 * 60 + 4]);
        assert_eq!(f.count_segments("split('10 min')").unwrap(), 2);
        assert_eq!(f.count_segments(Method::Split(Gap::default())).unwrap(), 2);
        assert!(!f.has_segment("emergency").unwrap());
        assert_eq!(
            f.count_segments("sliding_windows('100000000 days', '1 min')").unwrap(),
            1
        );
        assert_eq!(
            f.final_segment("split()").unwrap().unwrap().data().len(),
            2
        );

        let early: Rc<dyn EventDetector> = Rc::new(Matching::new("early", |row: &Row<'_>| {
            row.index() < 2
        }));
        let mut registry = Registry::default();
        registry.register(early.clone());
        let method = registry.resolve("early()").unwrap();
        assert_eq!(format!("{method:?}"), "early()");
        assert_eq!(f.next_segment(&method).unwrap().unwrap().data().len(), 2);
        assert_eq!(f.count_segments(early).unwrap(), 1);
        assert!(registry.resolve("early(1)").is_err());
        assert!(registry.resolve("split('1 min')").is_ok());

        let labelled = f.label("split()", &[("part", LabelValue::Template("{i}".into()))]).unwrap();
        assert_eq!(labelled.data().get(4, "part"), Value::Text("1".to_string()));
    }

    #[test]
    fn predicates() {
        let f = flight(&[0, 60, 120]);
        let longer: Predicate = "longer_than('2 min')".parse().unwrap();
        assert!(!longer.evaluate(&f).unwrap());
        let longer: Predicate = "longer_than('2 min', false)".parse().unwrap();
        assert!(longer.evaluate(&f).unwrap());
        let p: Predicate = "feature_gt('duration', '1 min')".parse().unwrap();
        assert!(p.evaluate(&f).unwrap());
        let p: Predicate = "feature_lt('longitude_max', 0.01)".parse().unwrap();
        assert!(!p.evaluate(&f).unwrap());
        assert!("feature_gt('altitude')".parse::<Predicate>().is_err());
        assert!("eval('1+1')".parse::<Predicate>().is_err());
    }
}
