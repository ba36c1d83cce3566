//! The in-memory time-series database: a name-keyed map of
//! [`series::TimeSeries`], plus the `CREATE`/`DELETE`/`ADDPOINTS` mutation
//! semantics dispatched on it by `crate::handlers`.

pub mod query;
pub mod record;
pub mod series;
pub mod tag_index;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StoreError;
use record::Label;
use series::TimeSeries;

/// A single point handed to [`Database::add_points`], already decoded off
/// the wire but before wall-clock substitution.
#[derive(Debug, Clone)]
pub struct PointInput {
    pub ts_sec: Option<u64>,
    pub ts_nsec: Option<u64>,
    pub value: f64,
    pub labels: Vec<Label>,
}

#[derive(Debug, Default)]
pub struct Database {
    series: HashMap<String, TimeSeries>,
}

impl Database {
    pub fn new() -> Self {
        Database { series: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&TimeSeries> {
        self.series.get(name)
    }

    /// `CREATE_TS`: inserts a new, empty series. Per spec §4.3/§9 open
    /// question 1, an existing name is reported with the same status code
    /// used for "series not found" elsewhere — preserved verbatim rather
    /// than introduced as a distinct status, see `crate::error::StoreError`.
    pub fn create(&mut self, name: &str, retention: u32) -> Result<(), StoreError> {
        if self.series.contains_key(name) {
            return Err(StoreError::NoSuchOrAlreadyExists);
        }
        self.series.insert(name.to_string(), TimeSeries::new(name.to_string(), retention));
        Ok(())
    }

    /// `DELETE_TS`: removes a series and releases all its storage.
    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        match self.series.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::NoSuchOrAlreadyExists),
        }
    }

    /// `ADDPOINTS`: auto-creates `name` with `retention=0` if absent, then
    /// appends each point in order, substituting wall-clock time for any
    /// unset timestamp component.
    pub fn add_points(&mut self, name: &str, points: Vec<PointInput>) {
        let series = self
            .series
            .entry(name.to_string())
            .or_insert_with(|| TimeSeries::new(name.to_string(), 0));

        for p in points {
            let (sec, nsec) = match (p.ts_sec, p.ts_nsec) {
                (Some(s), Some(n)) => (s, n),
                (sec, nsec) => {
                    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
                    (sec.unwrap_or(now.as_secs()), nsec.unwrap_or(u64::from(now.subsec_nanos())))
                }
            };
            let ts = sec.saturating_mul(1_000_000_000).saturating_add(nsec);
            series.append(ts, p.value, p.labels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_create_again_is_reported_as_already_exists() {
        let mut db = Database::new();
        assert!(db.create("metrics", 0).is_ok());
        assert_eq!(db.create("metrics", 0), Err(StoreError::NoSuchOrAlreadyExists));
    }

    #[test]
    fn delete_missing_series_is_enots() {
        let mut db = Database::new();
        assert_eq!(db.delete("missing"), Err(StoreError::NoSuchOrAlreadyExists));
    }

    #[test]
    fn delete_after_create_succeeds_once() {
        let mut db = Database::new();
        db.create("t", 0).unwrap();
        assert!(db.delete("t").is_ok());
        assert_eq!(db.delete("t"), Err(StoreError::NoSuchOrAlreadyExists));
    }

    #[test]
    fn add_points_auto_creates_unknown_series() {
        let mut db = Database::new();
        db.add_points(
            "temp",
            vec![PointInput { ts_sec: Some(1_700_000_000), ts_nsec: Some(0), value: 21.5, labels: vec![] }],
        );
        let s = db.get("temp").unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.timestamps()[0], 1_700_000_000_000_000_000);
    }

    #[test]
    fn add_points_fills_missing_timestamp_with_wall_clock() {
        let mut db = Database::new();
        db.add_points("cpu", vec![PointInput { ts_sec: None, ts_nsec: None, value: 0.4, labels: vec![] }]);
        let s = db.get("cpu").unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.timestamps()[0] > 0);
    }
}
