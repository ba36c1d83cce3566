//! Thin adapters from decoded [`crate::protocol::Packet`] requests to
//! [`crate::store::Database`] mutations/queries, and back to response
//! packets. Handlers never touch sockets; `crate::server` is the only
//! thing that writes bytes to a connection.

use log::{debug, warn};

use crate::protocol::{
    Ack, AddPoints, CreateTs, DeleteTs, Opcode, Packet, Query, QueryResponse, QueryResult, Status,
};
use crate::store::query::{self, QuerySelector};
use crate::store::{Database, PointInput};

/// Milliseconds-to-nanoseconds factor used for `QUERY`'s `mean_val` field,
/// per spec §4.3.
const MS_TO_NS: u64 = 1_000_000;

/// Runs `request` against `db` and returns the opcode/status/body of the
/// response frame to send back.
pub fn dispatch(db: &mut Database, request: Packet) -> (Opcode, Status, Packet) {
    match request {
        Packet::CreateTs(req) => handle_create_ts(db, req),
        Packet::DeleteTs(req) => handle_delete_ts(db, req),
        Packet::AddPoints(req) => handle_add_points(db, req),
        Packet::Query(req) => handle_query(db, req),
        // A client should never send these; respond as an unknown command
        // rather than silently accepting a malformed exchange.
        Packet::QueryResponse(_) | Packet::Ack(_) => {
            warn!("received a response-only opcode as a request");
            (Opcode::Ack, Status::UnknownCmd, Packet::Ack(Ack))
        }
    }
}

fn handle_create_ts(db: &mut Database, req: CreateTs) -> (Opcode, Status, Packet) {
    let status = match db.create(&req.name, req.retention) {
        Ok(()) => {
            debug!("created series {:?} (retention={})", req.name, req.retention);
            Status::Ok
        }
        Err(_) => Status::Enots,
    };
    (Opcode::Ack, status, Packet::Ack(Ack))
}

fn handle_delete_ts(db: &mut Database, req: DeleteTs) -> (Opcode, Status, Packet) {
    let status = match db.delete(&req.name) {
        Ok(()) => {
            debug!("deleted series {:?}", req.name);
            Status::Ok
        }
        Err(_) => Status::Enots,
    };
    (Opcode::Ack, status, Packet::Ack(Ack))
}

fn handle_add_points(db: &mut Database, req: AddPoints) -> (Opcode, Status, Packet) {
    let count = req.points.len();
    let points = req
        .points
        .into_iter()
        .map(|p| PointInput { ts_sec: p.ts_sec, ts_nsec: p.ts_nsec, value: p.value, labels: p.labels })
        .collect();

    db.add_points(&req.name, points);
    debug!("appended {} point(s) to {:?}", count, req.name);
    (Opcode::Ack, Status::Ok, Packet::Ack(Ack))
}

fn handle_query(db: &mut Database, req: Query) -> (Opcode, Status, Packet) {
    let series = match db.get(&req.name) {
        Some(series) => series,
        None => return (Opcode::QueryResponse, Status::Enots, Packet::QueryResponse(QueryResponse::default())),
    };

    let selector = query_selector_for(&req);
    let points = query::run(series, &selector);

    let results = points
        .into_iter()
        .map(|p| QueryResult {
            rc: 0,
            ts_sec: p.ts / 1_000_000_000,
            ts_nsec: p.ts % 1_000_000_000,
            value: p.value,
            labels: p.labels,
        })
        .collect();

    (Opcode::QueryResponse, Status::Ok, Packet::QueryResponse(QueryResponse { results }))
}

/// Translates a wire [`Query`]'s flags/fields into a [`QuerySelector`],
/// following the precedence order spec §4.3 lists: first, then last, then
/// mean (full or range-bounded), then plain range, defaulting to a full
/// scan.
fn query_selector_for(req: &Query) -> QuerySelector {
    if req.first {
        return QuerySelector::First;
    }
    if req.last {
        return QuerySelector::Last;
    }
    if let Some(mean_val) = req.mean_val {
        let window_ns = mean_val.saturating_mul(MS_TO_NS);
        return if req.major_of.is_some() || req.minor_of.is_some() {
            QuerySelector::MeanRange { lo: req.major_of, hi: req.minor_of, window_ns, anchor: req.major_of }
        } else {
            QuerySelector::MeanFull { window_ns }
        };
    }
    if req.major_of.is_some() || req.minor_of.is_some() {
        return QuerySelector::Range { lo: req.major_of, hi: req.minor_of };
    }
    QuerySelector::Full
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn create_then_create_again_surfaces_enots() {
        let mut db = Database::new();
        let req = CreateTs { name: "metrics".into(), retention: 0 };
        assert_eq!(handle_create_ts(&mut db, req.clone()).1, Status::Ok);
        assert_eq!(handle_create_ts(&mut db, req).1, Status::Enots);
    }

    #[test]
    fn delete_missing_is_enots() {
        let mut db = Database::new();
        assert_eq!(handle_delete_ts(&mut db, DeleteTs { name: "nope".into() }).1, Status::Enots);
    }

    #[test]
    fn query_on_missing_series_is_enots_with_empty_results() {
        let mut db = Database::new();
        let (_, status, packet) = handle_query(
            &mut db,
            Query { name: "nope".into(), mean_val: None, first: false, last: false, major_of: None, minor_of: None },
        );
        assert_eq!(status, Status::Enots);
        assert_eq!(packet, Packet::QueryResponse(QueryResponse::default()));
    }

    #[test]
    fn add_then_full_query_round_trips_one_point() {
        let mut db = Database::new();
        let add = AddPoints {
            name: "temp".into(),
            points: vec![crate::protocol::Point {
                ts_sec: Some(1_700_000_000),
                ts_nsec: Some(0),
                value: 21.5,
                labels: vec![("room".into(), "kitchen".into())],
            }],
        };
        handle_add_points(&mut db, add);

        let (opcode, status, packet) = handle_query(
            &mut db,
            Query { name: "temp".into(), mean_val: None, first: false, last: false, major_of: None, minor_of: None },
        );
        assert_eq!(opcode, Opcode::QueryResponse);
        assert_eq!(status, Status::Ok);
        match packet {
            Packet::QueryResponse(resp) => {
                assert_eq!(resp.results.len(), 1);
                assert_eq!(resp.results[0].ts_sec, 1_700_000_000);
                assert_eq!(resp.results[0].labels, vec![("room".to_string(), "kitchen".to_string())]);
            }
            _ => panic!("expected QueryResponse"),
        }
    }

    /// Scenario 3 (spec.md §8): two wall-clock-timestamped points land in
    /// the same 60s window and average to 0.5.
    #[test]
    fn avg_over_wall_clock_points_in_one_window() {
        let mut db = Database::new();
        handle_add_points(
            &mut db,
            AddPoints { name: "cpu".into(), points: vec![crate::protocol::Point { ts_sec: None, ts_nsec: None, value: 0.4, labels: vec![] }] },
        );
        handle_add_points(
            &mut db,
            AddPoints { name: "cpu".into(), points: vec![crate::protocol::Point { ts_sec: None, ts_nsec: None, value: 0.6, labels: vec![] }] },
        );

        let (_, status, packet) = handle_query(
            &mut db,
            Query { name: "cpu".into(), mean_val: Some(60_000), first: false, last: false, major_of: None, minor_of: None },
        );
        assert_eq!(status, Status::Ok);
        match packet {
            Packet::QueryResponse(resp) => {
                assert_eq!(resp.results.len(), 1);
                assert!((resp.results[0].value - 0.5).abs() < 1e-9);
            }
            _ => panic!("expected QueryResponse"),
        }
    }

    /// Invariant 6 (spec.md §8): a RANGE query includes both endpoint ties
    /// and returns them in non-decreasing timestamp order.
    #[test]
    fn range_query_includes_both_endpoint_ties() {
        let mut db = Database::new();
        let points = vec![
            crate::protocol::Point { ts_sec: Some(1), ts_nsec: Some(0), value: 1.0, labels: vec![] },
            crate::protocol::Point { ts_sec: Some(2), ts_nsec: Some(0), value: 2.0, labels: vec![] },
            crate::protocol::Point { ts_sec: Some(2), ts_nsec: Some(0), value: 2.5, labels: vec![] },
            crate::protocol::Point { ts_sec: Some(3), ts_nsec: Some(0), value: 3.0, labels: vec![] },
        ];
        handle_add_points(&mut db, AddPoints { name: "ts".into(), points });

        let (_, status, packet) = handle_query(
            &mut db,
            Query {
                name: "ts".into(),
                mean_val: None,
                first: false,
                last: false,
                major_of: Some(2_000_000_000),
                minor_of: Some(2_000_000_000),
            },
        );
        assert_eq!(status, Status::Ok);
        match packet {
            Packet::QueryResponse(resp) => {
                assert_eq!(resp.results.len(), 2);
                assert!(resp.results.iter().all(|r| r.ts_sec == 2));
            }
            _ => panic!("expected QueryResponse"),
        }
    }

    /// Round-trip of delete-after-create: the first delete succeeds, a
    /// second delete of the same (now-absent) name reports ENOTS.
    #[test]
    fn delete_after_create_then_delete_again_fails() {
        let mut db = Database::new();
        handle_create_ts(&mut db, CreateTs { name: "t".into(), retention: 0 });
        assert_eq!(handle_delete_ts(&mut db, DeleteTs { name: "t".into() }).1, Status::Ok);
        assert_eq!(handle_delete_ts(&mut db, DeleteTs { name: "t".into() }).1, Status::Enots);
    }

    /// Scenario 6 (spec.md §8): the tag index reaches exactly the records
    /// carrying each label value, and those records hold the values they
    /// were appended with.
    #[test]
    fn tag_index_separates_points_by_label_value() {
        let mut db = Database::new();
        handle_add_points(
            &mut db,
            AddPoints {
                name: "x".into(),
                points: vec![crate::protocol::Point {
                    ts_sec: None,
                    ts_nsec: None,
                    value: 1.0,
                    labels: vec![("label".into(), "a".into())],
                }],
            },
        );
        handle_add_points(
            &mut db,
            AddPoints {
                name: "x".into(),
                points: vec![crate::protocol::Point {
                    ts_sec: None,
                    ts_nsec: None,
                    value: 2.0,
                    labels: vec![("label".into(), "b".into())],
                }],
            },
        );

        let series = db.get("x").expect("series exists");
        let a_positions = series.tags().get("label", "a").expect("label a indexed");
        let b_positions = series.tags().get("label", "b").expect("label b indexed");
        assert_eq!(a_positions.len(), 1);
        assert_eq!(b_positions.len(), 1);
        assert_eq!(series.records()[a_positions[0]].value, 1.0);
        assert_eq!(series.records()[b_positions[0]].value, 2.0);
    }

    /// `ADDPOINTS` on an unknown name auto-creates it with `retention=0`,
    /// per spec.md §4.3.
    #[test]
    fn add_points_auto_creates_unknown_series_with_zero_retention() {
        let mut db = Database::new();
        handle_add_points(
            &mut db,
            AddPoints {
                name: "auto".into(),
                points: vec![crate::protocol::Point { ts_sec: Some(1), ts_nsec: Some(0), value: 9.0, labels: vec![] }],
            },
        );
        let series = db.get("auto").expect("auto-created");
        assert_eq!(series.retention, 0);
        assert_eq!(series.len(), 1);
    }
}
