//! The two-level label-tag index: `label_name -> label_value -> [position]`.
//!
//! Positions are indices into the owning `TimeSeries`'s `records`/`timestamps`
//! vectors, not pointers — per spec §9, this is how the store avoids
//! reference-counted or unsafe non-owning references. A series' tag index is
//! dropped along with the series, tearing the whole structure down at once.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    by_name: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a reference to the record at `position` for every label on
    /// it.
    pub fn insert(&mut self, position: usize, labels: &[(String, String)]) {
        for (name, value) in labels {
            self.by_name
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .push(position);
        }
    }

    /// Bumps every stored position `>= at` up by one, to account for a new
    /// record having been inserted in the middle of the series' storage
    /// (an out-of-order append; see `TimeSeries::append`). A no-op
    /// in the common case where appends land at the end.
    pub fn shift_positions_from(&mut self, at: usize) {
        for values in self.by_name.values_mut() {
            for positions in values.values_mut() {
                for p in positions.iter_mut() {
                    if *p >= at {
                        *p += 1;
                    }
                }
            }
        }
    }

    pub fn get(&self, name: &str, value: &str) -> Option<&[usize]> {
        self.by_name.get(name)?.get(value).map(|v| v.as_slice())
    }

    #[cfg(test)]
    pub fn label_count(&self, name: &str, value: &str) -> usize {
        self.get(name, value).map_or(0, |v| v.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut idx = TagIndex::new();
        idx.insert(0, &[("room".into(), "kitchen".into())]);
        idx.insert(1, &[("room".into(), "den".into())]);

        assert_eq!(idx.get("room", "kitchen"), Some(&[0usize][..]));
        assert_eq!(idx.get("room", "den"), Some(&[1usize][..]));
        assert_eq!(idx.get("room", "attic"), None);
    }

    #[test]
    fn shift_positions_from_accounts_for_out_of_order_insert() {
        let mut idx = TagIndex::new();
        idx.insert(0, &[("k".into(), "a".into())]);
        idx.insert(1, &[("k".into(), "b".into())]);

        // A new record lands at position 1, pushing the old position-1
        // record to position 2.
        idx.shift_positions_from(1);
        idx.insert(1, &[("k".into(), "c".into())]);

        assert_eq!(idx.get("k", "a"), Some(&[0usize][..]));
        assert_eq!(idx.get("k", "b"), Some(&[2usize][..]));
        assert_eq!(idx.get("k", "c"), Some(&[1usize][..]));
    }
}
