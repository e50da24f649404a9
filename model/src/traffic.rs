use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::Add;

use crate::table::{Table, Value};
use crate::trajectory::Trajectory;
use crate::Result;

/// Several trajectories, kept in the order they were combined.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Traffic {
    flights: Vec<Trajectory>,
}

impl Traffic {
    pub fn new(flights: Vec<Trajectory>) -> Self {
        Self { flights }
    }

    /// Splits one table into a trajectory per distinct value of `key`, like `icao24` or
    /// `flight_id`. Rows without a key are ignored.
    pub fn from_table(table: &Table, key: &str) -> Result<Self> {
        let Some(column) = table.column(key) else {
            return Err(crate::Error::missing(key, "Can't group rows into trajectories without it."));
        };
        // Keep the order of first appearance
        let mut order: Vec<String> = Vec::new();
        let mut rows_per_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for row in 0..table.len() {
            let value = column.get(row);
            if value.is_null() {
                continue;
            }
            let name = value.to_string();
            let rows = rows_per_key.entry(name.clone()).or_insert_with(|| {
                order.push(name);
                Vec::new()
            });
            rows.push(row);
        }

        let mut flights = Vec::new();
        for name in order {
            if let Some(rows) = rows_per_key.get(&name) {
                flights.push(Trajectory::new(table.take(rows))?.sort_by_time());
            }
        }
        info!("Grouped {} rows by {key} into {} trajectories", table.len(), flights.len());
        Ok(Self { flights })
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<Trajectory> {
        self.flights.iter()
    }

    /// The first trajectory whose `key` column uniquely holds `value`.
    pub fn get(&self, key: &str, value: impl Into<Value>) -> Option<&Trajectory> {
        let value = value.into();
        self.flights
            .iter()
            .find(|f| f.unique(key).one().as_ref() == Some(&value))
    }

    /// Every sample of every trajectory stacked into one table.
    pub fn data(&self) -> Result<Table> {
        let tables: Vec<&Table> = self.flights.iter().map(|f| f.data()).collect();
        Table::concat(&tables)
    }
}

impl Add for Traffic {
    type Output = Traffic;

    fn add(mut self, other: Traffic) -> Traffic {
        self.flights.extend(other.flights);
        self
    }
}

impl Add<Trajectory> for Traffic {
    type Output = Traffic;

    fn add(mut self, other: Trajectory) -> Traffic {
        self.flights.push(other);
        self
    }
}

/// Summing nothing gives an empty collection.
impl Sum<Trajectory> for Traffic {
    fn sum<I: Iterator<Item = Trajectory>>(iter: I) -> Self {
        Self::new(iter.collect())
    }
}

impl Sum for Traffic {
    fn sum<I: Iterator<Item = Traffic>>(iter: I) -> Self {
        iter.fold(Traffic::default(), |acc, next| acc + next)
    }
}

impl FromIterator<Trajectory> for Traffic {
    fn from_iter<I: IntoIterator<Item = Trajectory>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Traffic {
    type Item = Trajectory;
    type IntoIter = std::vec::IntoIter<Trajectory>;

    fn into_iter(self) -> Self::IntoIter {
        self.flights.into_iter()
    }
}

impl<'a> IntoIterator for &'a Traffic {
    type Item = &'a Trajectory;
    type IntoIter = std::slice::Iter<'a, Trajectory>;

    fn into_iter(self) -> Self::IntoIter {
        self.flights.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::trajectory::tests::{flight, t};

    #[test]
    fn combining() {
        let a = flight(&[0, 1]);
        let b = flight(&[5, 6, 7]);
        let traffic = a.clone() + b.clone();
        assert_eq!(traffic.len(), 2);
        let traffic = traffic + a.clone();
        assert_eq!(traffic.len(), 3);
        let traffic = a.clone() + traffic;
        assert_eq!(traffic.iter().next(), Some(&a));

        let none: Traffic = Vec::<Trajectory>::new().into_iter().sum();
        assert!(none.is_empty());
        let some: Traffic = vec![a, b].into_iter().sum();
        assert_eq!(some.data().unwrap().len(), 5);
    }

    #[test]
    fn grouping() {
        let table = Table::new(vec![
            (
                "timestamp".to_string(),
                Column::Time(vec![Some(t(3)), Some(t(0)), Some(t(1)), Some(t(2))]),
            ),
            ("latitude".to_string(), Column::floats(vec![0.0; 4])),
            ("longitude".to_string(), Column::floats(vec![0.0; 4])),
            (
                "icao24".to_string(),
                Column::Text(vec![
                    Some("b".to_string()),
                    Some("a".to_string()),
                    None,
                    Some("b".to_string()),
                ]),
            ),
        ])
        .unwrap();
        let traffic = Traffic::from_table(&table, "icao24").unwrap();
        assert_eq!(traffic.len(), 2);
        let b = traffic.get("icao24", "b").unwrap();
        assert_eq!(b.times(), &[t(2), t(3)]);
        assert!(Traffic::from_table(&table, "callsign").is_err());
    }
}
