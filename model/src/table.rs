//! An immutable, column-oriented table: ordered rows, named nullable typed columns. Every operation
//! builds a new table.

use std::fmt;

use chrono::Duration;

use crate::time::{format_duration, format_time, seconds, Time};
use crate::{Error, Result};

/// One cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(Time),
    Duration(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(x) => x.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) if !x.is_nan() => Some(*x),
            Value::Int(x) => Some(*x as f64),
            Value::Bool(x) => Some(if *x { 1.0 } else { 0.0 }),
            Value::Duration(d) => Some(seconds(*d)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Time> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(x) => Some(*x),
            _ => None,
        }
    }

    /// Compares values of compatible kinds. Numbers compare across Int and Float.
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

/// A totally ordered stand-in for a `Value`, for sets and maps. Floats compare by their bits,
/// with -0.0 folded into 0.0.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Time(Time),
    Duration(Duration),
}

impl Value {
    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(x) => ValueKey::Bool(*x),
            Value::Int(x) => ValueKey::Int(*x),
            Value::Float(x) if *x == 0.0 => ValueKey::Float(0.0f64.to_bits()),
            Value::Float(x) => ValueKey::Float(x.to_bits()),
            Value::Text(x) => ValueKey::Text(x.clone()),
            Value::Time(x) => ValueKey::Time(*x),
            Value::Duration(x) => ValueKey::Duration(*x),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(x) => write!(f, "{x}"),
            Value::Int(x) => write!(f, "{x}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(x) => write!(f, "{x}"),
            Value::Time(t) => write!(f, "{}", format_time(*t)),
            Value::Duration(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<usize> for Value {
    fn from(x: usize) -> Self {
        Value::Int(x as i64)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Text(x.to_string())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Text(x)
    }
}

impl From<Time> for Value {
    fn from(x: Time) -> Self {
        Value::Time(x)
    }
}

impl From<Duration> for Value {
    fn from(x: Duration) -> Self {
        Value::Duration(x)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(x: Option<T>) -> Self {
        x.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Float,
    Int,
    Bool,
    Text,
    Time,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DType::Float => "float",
            DType::Int => "int",
            DType::Bool => "bool",
            DType::Text => "text",
            DType::Time => "timestamp",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Time(Vec<Option<Time>>),
}

impl Column {
    pub fn nulls(dtype: DType, len: usize) -> Column {
        match dtype {
            DType::Float => Column::Float(vec![None; len]),
            DType::Int => Column::Int(vec![None; len]),
            DType::Bool => Column::Bool(vec![None; len]),
            DType::Text => Column::Text(vec![None; len]),
            DType::Time => Column::Time(vec![None; len]),
        }
    }

    pub fn floats(values: Vec<f64>) -> Column {
        Column::Float(
            values
                .into_iter()
                .map(|x| if x.is_nan() { None } else { Some(x) })
                .collect(),
        )
    }

    /// Infers the narrowest type able to hold everything. Mixed kinds fall back to text, durations
    /// become float seconds, and a column of only nulls is text.
    pub fn from_values(values: &[Value]) -> Column {
        let mut kinds = [false; 6];
        for value in values {
            let idx = match value {
                Value::Null => continue,
                Value::Float(x) if x.is_nan() => continue,
                Value::Bool(_) => 0,
                Value::Int(_) => 1,
                Value::Float(_) | Value::Duration(_) => 2,
                Value::Text(_) => 3,
                Value::Time(_) => 4,
            };
            kinds[idx] = true;
        }
        let [any_bool, any_int, any_float, any_text, any_time, _] = kinds;
        let numeric = any_int || any_float;

        if any_text || (any_time && (numeric || any_bool)) || (any_bool && numeric) {
            return Column::Text(
                values
                    .iter()
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect(),
            );
        }
        if any_time {
            return Column::Time(values.iter().map(|v| v.as_time()).collect());
        }
        if any_float {
            return Column::Float(values.iter().map(|v| v.as_f64()).collect());
        }
        if any_int {
            return Column::Int(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Int(x) => Some(*x),
                        _ => None,
                    })
                    .collect(),
            );
        }
        if any_bool {
            return Column::Bool(values.iter().map(|v| v.as_bool()).collect());
        }
        Column::Text(vec![None; values.len()])
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Float(_) => DType::Float,
            Column::Int(_) => DType::Int,
            Column::Bool(_) => DType::Bool,
            Column::Text(_) => DType::Text,
            Column::Time(_) => DType::Time,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Float(_) | Column::Int(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(x) => x.len(),
            Column::Int(x) => x.len(),
            Column::Bool(x) => x.len(),
            Column::Text(x) => x.len(),
            Column::Time(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Value {
        match self {
            Column::Float(x) => x[idx].into(),
            Column::Int(x) => x[idx].into(),
            Column::Bool(x) => x[idx].into(),
            Column::Text(x) => x[idx].clone().into(),
            Column::Time(x) => x[idx].into(),
        }
    }

    pub fn is_null(&self, idx: usize) -> bool {
        match self {
            Column::Float(x) => x[idx].is_none(),
            Column::Int(x) => x[idx].is_none(),
            Column::Bool(x) => x[idx].is_none(),
            Column::Text(x) => x[idx].is_none(),
            Column::Time(x) => x[idx].is_none(),
        }
    }

    pub fn count_valid(&self) -> usize {
        (0..self.len()).filter(|i| !self.is_null(*i)).count()
    }

    pub fn f64(&self, idx: usize) -> Option<f64> {
        match self {
            Column::Float(x) => x[idx],
            Column::Int(x) => x[idx].map(|v| v as f64),
            Column::Bool(x) => x[idx].map(|v| if v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Numeric view; `None` for text and timestamps.
    pub fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        if !matches!(self, Column::Float(_) | Column::Int(_) | Column::Bool(_)) {
            return None;
        }
        Some((0..self.len()).map(|i| self.f64(i)).collect())
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Picks rows in the given order. Indices may repeat.
    pub fn take(&self, indices: &[usize]) -> Column {
        fn pick<T: Clone>(x: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
            indices.iter().map(|i| x[*i].clone()).collect()
        }
        match self {
            Column::Float(x) => Column::Float(pick(x, indices)),
            Column::Int(x) => Column::Int(pick(x, indices)),
            Column::Bool(x) => Column::Bool(pick(x, indices)),
            Column::Text(x) => Column::Text(pick(x, indices)),
            Column::Time(x) => Column::Time(pick(x, indices)),
        }
    }

    /// Casts to `dtype` if the values allow it. Only widening casts and casts of all-null columns
    /// are supported.
    pub fn cast(&self, dtype: DType) -> Option<Column> {
        if self.dtype() == dtype {
            return Some(self.clone());
        }
        if self.count_valid() == 0 {
            return Some(Column::nulls(dtype, self.len()));
        }
        match (self, dtype) {
            (Column::Int(x), DType::Float) => {
                Some(Column::Float(x.iter().map(|v| v.map(|v| v as f64)).collect()))
            }
            (_, DType::Text) => Some(Column::Text(
                (0..self.len())
                    .map(|i| (!self.is_null(i)).then(|| self.get(i).to_string()))
                    .collect(),
            )),
            _ => None,
        }
    }

    fn append(&mut self, other: &Column) {
        match (self, other) {
            (Column::Float(a), Column::Float(b)) => a.extend_from_slice(b),
            (Column::Int(a), Column::Int(b)) => a.extend_from_slice(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::Text(a), Column::Text(b)) => a.extend_from_slice(b),
            (Column::Time(a), Column::Time(b)) => a.extend_from_slice(b),
            _ => unreachable!("append called on columns of different types"),
        }
    }

    /// Overwrites the masked rows with `value`, widening the type if needed.
    pub fn fill_where(&self, mask: &[bool], value: &Value) -> Column {
        let mut values = self.values();
        for (slot, hit) in values.iter_mut().zip(mask) {
            if *hit {
                *slot = value.clone();
            }
        }
        let filled = Column::from_values(&values);
        // Keep the declared type when nothing forces a change
        filled.cast(self.dtype()).unwrap_or(filled)
    }
}

/// The type a set of columns is concatenated as. All-null columns never force a type, and ints
/// widen to floats.
fn common_dtype<'a>(columns: impl Iterator<Item = &'a Column>) -> std::result::Result<DType, DType> {
    let mut fallback = None;
    let mut current: Option<DType> = None;
    for column in columns {
        fallback.get_or_insert(column.dtype());
        if column.count_valid() == 0 {
            continue;
        }
        current = Some(match (current, column.dtype()) {
            (None, dt) => dt,
            (Some(a), b) if a == b => a,
            (Some(DType::Int), DType::Float) | (Some(DType::Float), DType::Int) => DType::Float,
            (Some(a), _) => return Err(a),
        });
    }
    Ok(current.or(fallback).unwrap_or(DType::Text))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
    len: usize,
}

impl Table {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let len = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        for (idx, (name, column)) in columns.iter().enumerate() {
            if column.len() != len {
                return Err(Error::invalid(format!(
                    "Column {name} has {} rows, but {} has {len}",
                    column.len(),
                    columns[0].0
                )));
            }
            if columns[..idx].iter().any(|(other, _)| other == name) {
                return Err(Error::invalid(format!("Column {name} appears twice")));
            }
        }
        Ok(Self { columns, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    pub fn has(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    pub fn get(&self, row: usize, name: &str) -> Value {
        self.column(name)
            .map(|column| column.get(row))
            .unwrap_or(Value::Null)
    }

    pub fn row(&self, idx: usize) -> Row<'_> {
        Row { table: self, idx }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len).map(move |idx| self.row(idx))
    }

    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.take(indices)))
                .collect(),
            len: indices.len(),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Table {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect();
        self.take(&indices)
    }

    pub fn slice(&self, range: std::ops::Range<usize>) -> Table {
        let indices: Vec<usize> = range.collect();
        self.take(&indices)
    }

    /// Replaces the column if it exists, or appends it.
    pub fn with_column(&self, name: &str, column: Column) -> Result<Table> {
        if column.len() != self.len && !self.columns.is_empty() {
            return Err(Error::invalid(format!(
                "Column {name} has {} rows, but the table has {}",
                column.len(),
                self.len
            )));
        }
        let mut columns = self.columns.clone();
        match columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = column,
            None => columns.push((name.to_string(), column)),
        }
        Table::new(columns)
    }

    pub fn without(&self, names: &[&str]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .filter(|(name, _)| !names.contains(&name.as_str()))
                .cloned()
                .collect(),
            len: self.len,
        }
    }

    /// Stacks tables vertically. Columns missing from some tables are filled with nulls.
    pub fn concat(tables: &[&Table]) -> Result<Table> {
        let mut names: Vec<String> = Vec::new();
        for table in tables {
            for name in table.names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }

        let mut columns = Vec::new();
        for name in names {
            let dtype = common_dtype(tables.iter().filter_map(|t| t.column(&name))).map_err(
                |expected| Error::TypeMismatch {
                    column: name.clone(),
                    expected: expected.to_string(),
                },
            )?;

            let mut out = Column::nulls(dtype, 0);
            for table in tables {
                match table.column(&name) {
                    Some(column) => {
                        let cast = column.cast(dtype).ok_or_else(|| Error::TypeMismatch {
                            column: name.clone(),
                            expected: dtype.to_string(),
                        })?;
                        out.append(&cast);
                    }
                    None => out.append(&Column::nulls(dtype, table.len())),
                }
            }
            columns.push((name, out));
        }

        if columns.is_empty() {
            return Ok(Table {
                columns,
                len: tables.iter().map(|t| t.len()).sum(),
            });
        }
        Table::new(columns)
    }
}

/// A borrowed view of one row.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    idx: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn get(&self, name: &str) -> Value {
        self.table.get(self.idx, name)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.table.column(name)?.f64(self.idx)
    }

    pub fn text(&self, name: &str) -> Option<&'a str> {
        match self.table.column(name)? {
            Column::Text(x) => x[self.idx].as_deref(),
            _ => None,
        }
    }

    pub fn time(&self, name: &str) -> Option<Time> {
        match self.table.column(name)? {
            Column::Time(x) => x[self.idx],
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.table.column(name)? {
            Column::Bool(x) => x[self.idx],
            _ => None,
        }
    }

    pub fn is_null(&self, name: &str) -> bool {
        self.table
            .column(name)
            .map(|column| column.is_null(self.idx))
            .unwrap_or(true)
    }
}
