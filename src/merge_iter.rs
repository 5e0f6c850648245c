//! The k-way merged iterator over a controller's data streams: every
//! timestamp recorded by any of them, ascending, without duplicates
//! (`spec.md` §4.6, invariant 8).
//!
//! Iterator-mode acquisition/release is scoped by an RAII guard rather than
//! left to the caller to pair `on(true)`/`on(false)` by hand — a dropped or
//! early-returned iteration still releases every stream (`spec.md` §5, §9
//! "Iterator-mode scoping").

use std::collections::BTreeSet;

use crate::controller::StreamController;
use crate::time::Timestamp;

pub struct MergedTimestamps<'a> {
    controller: &'a StreamController,
    dates: std::vec::IntoIter<Timestamp>,
}

impl<'a> MergedTimestamps<'a> {
    pub fn new(controller: &'a StreamController) -> Self {
        controller.on(true);
        let merged: BTreeSet<Timestamp> = controller.data_streams().flat_map(|s| s.dates()).collect();
        Self {
            controller,
            dates: merged.into_iter().collect::<Vec<_>>().into_iter(),
        }
    }
}

impl<'a> Iterator for MergedTimestamps<'a> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        self.dates.next()
    }
}

impl<'a> Drop for MergedTimestamps<'a> {
    fn drop(&mut self) {
        self.controller.on(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Value;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn yields_every_timestamp_once_in_ascending_order() {
        let mut controller = StreamController::new(BTreeMap::new());
        controller.add_value("a", ts(10), Value::Int(1)).unwrap();
        controller.add_value("a", ts(30), Value::Int(2)).unwrap();
        controller.add_value("b", ts(20), Value::Int(3)).unwrap();
        controller.add_value("b", ts(30), Value::Int(4)).unwrap();

        let merged: Vec<_> = MergedTimestamps::new(&controller).collect();
        assert_eq!(merged, vec![ts(10), ts(20), ts(30)]);
        assert!(controller.data_streams().all(|s| !s.is_iterating()));
    }
}
