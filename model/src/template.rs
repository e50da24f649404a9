//! Tiny string templates for generated identifiers and labels, like `"{self.callsign}_{i:03}"`.
//!
//! Placeholders are `{i}` (or `{idx}`) for the running index, `{self.<property>}` and
//! `{segment.<property>}` for properties of the trajectories involved, and `{self}` / `{segment}`
//! for their title. A format spec after `:` gives a minimum width; a leading `0` pads numbers
//! with zeros. `{{` and `}}` are literal braces.

use crate::table::Value;
use crate::trajectory::Trajectory;
use crate::{Error, Result};

/// What placeholders can refer to.
#[derive(Clone, Copy, Default)]
pub struct Context<'a> {
    pub index: Option<usize>,
    pub this: Option<&'a Trajectory>,
    pub segment: Option<&'a Trajectory>,
}

impl<'a> Context<'a> {
    pub fn new(index: usize, this: &'a Trajectory) -> Self {
        Self {
            index: Some(index),
            this: Some(this),
            segment: None,
        }
    }

    pub fn with_segment(mut self, segment: &'a Trajectory) -> Self {
        self.segment = Some(segment);
        self
    }
}

pub fn render(template: &str, ctx: &Context) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut placeholder = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => placeholder.push(c),
                        None => {
                            return Err(Error::parse(format!("unclosed {{ in {template:?}")));
                        }
                    }
                }
                out.push_str(&expand(&placeholder, ctx)?);
            }
            '}' => return Err(Error::parse(format!("stray }} in {template:?}"))),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn expand(placeholder: &str, ctx: &Context) -> Result<String> {
    let (key, spec) = match placeholder.split_once(':') {
        Some((key, spec)) => (key.trim(), Some(spec.trim())),
        None => (placeholder.trim(), None),
    };

    let value = match key.split_once('.') {
        None => match key {
            "i" | "idx" => Value::from(
                ctx.index
                    .ok_or_else(|| Error::invalid("{i} used without an index"))?,
            ),
            "self" => Value::Text(subject(ctx.this, key)?.title()),
            "segment" => Value::Text(subject(ctx.segment, key)?.title()),
            _ => return Err(Error::invalid(format!("unknown placeholder {{{key}}}"))),
        },
        Some((owner, property)) => {
            let trajectory = match owner {
                "self" => subject(ctx.this, owner)?,
                "segment" => subject(ctx.segment, owner)?,
                _ => return Err(Error::invalid(format!("unknown placeholder {{{key}}}"))),
            };
            trajectory.property(property)?
        }
    };
    pad(&value, spec)
}

fn subject<'a>(trajectory: Option<&'a Trajectory>, name: &str) -> Result<&'a Trajectory> {
    trajectory.ok_or_else(|| Error::invalid(format!("{{{name}}} isn't available here")))
}

fn pad(value: &Value, spec: Option<&str>) -> Result<String> {
    let text = value.to_string();
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(text);
    };
    let zeros = spec.starts_with('0');
    let width: usize = spec
        .trim_end_matches('d')
        .parse()
        .map_err(|_| Error::parse(format!("bad format spec {spec:?}")))?;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_));
    Ok(if numeric && zeros {
        let (sign, digits) = match text.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", text.as_str()),
        };
        format!("{sign}{digits:0>width$}", width = width.saturating_sub(sign.len()))
    } else if numeric {
        format!("{text:>width$}")
    } else {
        format!("{text:<width$}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::trajectory::tests::flight;

    #[test]
    fn placeholders() {
        let f = flight(&[0, 1])
            .assign(
                "callsign",
                Column::Text(vec![Some("EZY1234".into()), Some("EZY1234".into())]),
            )
            .unwrap();
        let ctx = Context::new(7, &f);
        assert_eq!(render("{self.callsign}_{i}", &ctx).unwrap(), "EZY1234_7");
        assert_eq!(render("{idx:03}", &ctx).unwrap(), "007");
        assert_eq!(render("{{literal}}", &ctx).unwrap(), "{literal}");
        assert_eq!(render("{self.duration}", &ctx).unwrap(), "0 days 00:00:01");

        assert!(render("{segment.callsign}", &ctx).is_err());
        assert!(render("{self.nope}", &ctx).is_err());
        assert!(render("{oops", &ctx).is_err());
        assert!(render("{what}", &ctx).is_err());
    }
}
