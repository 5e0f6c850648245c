//! End-to-end scenarios, one test per literal example in the specification's
//! testable-properties section: stepwise string streams, linear
//! interpolation, arithmetic over derived streams, mixed-presence frames,
//! dependency chains, and duplicate-key resolution.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use stateful::{CalculatedStream, Dtype, Interpolation, Record, State, StreamConfig, Timestamp, Value};

fn ts(y: i32, m: u32, d: u32) -> Timestamp {
    Timestamp::new(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
}

fn row(id: i64, time: Timestamp, fields: &[(&str, Value)]) -> Record {
    let mut r = Record::new();
    r.insert("id".to_string(), Value::Int(id));
    r.insert("date".to_string(), Value::Str(time.to_string()));
    for (k, v) in fields {
        r.insert((*k).to_string(), v.clone());
    }
    r
}

fn linear_integer_config(name: &str) -> BTreeMap<String, StreamConfig> {
    let mut config = BTreeMap::new();
    config.insert(
        name.to_string(),
        StreamConfig { dtype: Some(Dtype::Integer), interpolation: Interpolation::Linear, on_duplicate: Default::default() },
    );
    config
}

/// S1 — stepwise string stream: before the first point every field reads
/// null, and after the second point both fields hold their last value.
#[test]
fn s1_stepwise_string_stream() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", BTreeMap::new());
    state.add(row(1, ts(2020, 12, 10), &[("kind", Value::from("elf"))]))?;
    state.add(row(1, ts(2020, 12, 22), &[("can_make", Value::from("presents"))]))?;

    let space = state.space(&Value::Int(1)).unwrap();

    let before = space.get_at(ts(2020, 12, 9), false, false)?;
    similar_asserts::assert_eq!(before.get("kind"), Value::Null);
    similar_asserts::assert_eq!(before.get("can_make"), Value::Null);

    let after = space.get_at(ts(2020, 12, 23), false, false)?;
    similar_asserts::assert_eq!(after.get("kind"), Value::Str("elf".into()));
    similar_asserts::assert_eq!(after.get("can_make"), Value::Str("presents".into()));

    Ok(())
}

/// S2 — linear integer stream: a midpoint query between two recorded points
/// returns the integer cast of the linearly interpolated value.
#[test]
fn s2_linear_integer_stream() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", linear_integer_config("amount"));
    state.add(row(1, ts(2020, 12, 21), &[("amount", Value::Int(4))]))?;
    state.add(row(1, ts(2020, 12, 22), &[("amount", Value::Int(5))]))?;
    state.add(row(1, ts(2020, 12, 24), &[("amount", Value::Int(100))]))?;

    let space = state.space(&Value::Int(1)).unwrap();
    let event = space.get_at(ts(2020, 12, 23), false, false)?;
    similar_asserts::assert_eq!(event.get("amount"), Value::Int(52));

    Ok(())
}

/// S3 — arithmetic over two linear integer streams: the derived sum at the
/// midpoint equals the linear interpolation of the summed endpoints.
#[test]
fn s3_arithmetic_over_linear_streams() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", linear_integer_config("amount"));
    state.add(row(1, ts(2020, 1, 1), &[("amount", Value::Int(0))]))?;
    state.add(row(1, ts(2020, 1, 3), &[("amount", Value::Int(5))]))?;

    let amount = state.stream("amount");
    let doubled = amount.clone() + amount;
    state.declare("doubled", doubled)?;

    let space = state.space(&Value::Int(1)).unwrap();
    let event = space.get_at(ts(2020, 1, 2), false, false)?;
    similar_asserts::assert_eq!(event.get("doubled"), Value::Int(5));

    Ok(())
}

/// S4 — mixed-presence frame: three spaces recording non-overlapping update
/// timestamps each produce an `EventFrame` of the requested length, with
/// nulls before the first recorded point and step-floor values after.
#[test]
fn s4_mixed_presence_frame() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", BTreeMap::new());
    state.add(row(1, ts(2020, 12, 20), &[("mood", Value::from("sleepy"))]))?;
    state.add(row(2, ts(2020, 12, 22), &[("mood", Value::from("busy"))]))?;
    state.add(row(3, ts(2020, 12, 24), &[("mood", Value::from("jolly"))]))?;

    let dates = [20, 21, 22, 23, 24, 25].map(|d| ts(2020, 12, d));
    let frames = state.all(&dates)?;

    similar_asserts::assert_eq!(frames.len(), 3);
    for frame in &frames {
        similar_asserts::assert_eq!(frame.len(), dates.len());
    }

    let by_id = |value: i64| {
        frames
            .iter()
            .find(|frame| frame.column("id").unwrap().row(0) == Value::Int(value))
            .unwrap()
    };

    let space_one = by_id(1);
    similar_asserts::assert_eq!(space_one.column("mood").unwrap().row(0), Value::Str("sleepy".into()));
    similar_asserts::assert_eq!(space_one.column("mood").unwrap().row(5), Value::Str("sleepy".into()));

    let space_two = by_id(2);
    similar_asserts::assert_eq!(space_two.column("mood").unwrap().row(0), Value::Null);
    similar_asserts::assert_eq!(space_two.column("mood").unwrap().row(2), Value::Str("busy".into()));

    let space_three = by_id(3);
    similar_asserts::assert_eq!(space_three.column("mood").unwrap().row(3), Value::Null);
    similar_asserts::assert_eq!(space_three.column("mood").unwrap().row(4), Value::Str("jolly".into()));

    Ok(())
}

/// S5 — a two-level dependency chain (`half = amount / 2`,
/// `combined = amount + half`) resolves in topological order and produces
/// the values the specification calls out, including the integer cast at a
/// fractional midpoint.
#[test]
fn s5_dependency_chain() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", linear_integer_config("amount"));
    let t0 = ts(2020, 1, 1);
    let t1 = ts(2020, 1, 2);
    let t2 = ts(2020, 1, 3);
    state.add(row(1, t0, &[("amount", Value::Int(-100))]))?;
    state.add(row(1, t1, &[("amount", Value::Int(50))]))?;
    state.add(row(1, t2, &[("amount", Value::Int(100))]))?;

    let amount = state.stream("amount");
    let half = amount.clone() / Value::Int(2);
    state.declare("half", half)?;

    let amount = state.stream("amount");
    let half = state.stream("half");
    let combined = amount + half;
    state.declare("combined", combined)?;

    let space = state.space(&Value::Int(1)).unwrap();

    let at_start = space.get_at(t0, false, false)?;
    similar_asserts::assert_eq!(at_start.get("combined"), Value::Int(-150));

    let midpoint = Timestamp::new(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap());
    let at_mid = space.get_at(midpoint, false, false)?;
    similar_asserts::assert_eq!(at_mid.get("combined"), Value::Int(-37));

    Ok(())
}

/// S6 — duplicate-key `increment`: colliding inserts at the same timestamp
/// retry one second later each time, growing `length` by exactly one per
/// insert.
#[test]
fn s6_duplicate_increment() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", BTreeMap::new());
    let t = ts(2020, 1, 1);
    state.add(row(1, t, &[("counter", Value::Int(1))]))?;
    state.add(row(1, t, &[("counter", Value::Int(2))]))?;

    let space = state.space(&Value::Int(1)).unwrap();
    similar_asserts::assert_eq!(space.len(), 2);
    similar_asserts::assert_eq!(space.get_at(t, false, false)?.get("counter"), Value::Int(1));
    similar_asserts::assert_eq!(space.get_at(t.plus_one_second(), false, false)?.get("counter"), Value::Int(2));

    state.add(row(1, t, &[("counter", Value::Int(3))]))?;
    similar_asserts::assert_eq!(space_again(&state).len(), 3);
    let two_seconds_later = t.plus_one_second().plus_one_second();
    similar_asserts::assert_eq!(space_again(&state).get_at(two_seconds_later, false, false)?.get("counter"), Value::Int(3));

    Ok(())
}

fn space_again(state: &State) -> &stateful::Space {
    state.space(&Value::Int(1)).unwrap()
}

/// A derived stream declared at the `State` level before any space exists
/// still resolves once spaces are created afterwards — the propagation
/// behavior from `spec.md` §4.8 reaffirmed in `SPEC_FULL.md` §2.
#[test]
fn declared_stream_propagates_to_spaces_created_later() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", linear_integer_config("amount"));
    state.add(row(1, ts(2020, 1, 1), &[("amount", Value::Int(10))]))?;

    let amount = state.stream("amount");
    let doubled = amount.clone() + amount;
    state.declare("doubled", doubled)?;

    state.add(row(2, ts(2020, 1, 1), &[("amount", Value::Int(7))]))?;

    similar_asserts::assert_eq!(
        state.space(&Value::Int(2)).unwrap().get_at(ts(2020, 1, 1), false, false)?.get("doubled"),
        Value::Int(14)
    );

    Ok(())
}

/// Merged iteration over a space yields every recorded timestamp across its
/// streams, ascending, without duplicates (invariant 8).
#[test]
fn merged_iteration_covers_every_recorded_timestamp() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", BTreeMap::new());
    state.add(row(1, ts(2020, 1, 1), &[("a", Value::Int(1))]))?;
    state.add(row(1, ts(2020, 1, 3), &[("b", Value::Int(2))]))?;
    state.add(row(1, ts(2020, 1, 2), &[("a", Value::Int(3))]))?;

    let space = state.space(&Value::Int(1)).unwrap();
    let dates: Vec<_> = space.iter().map(|event| event.date()).collect();
    similar_asserts::assert_eq!(dates, vec![ts(2020, 1, 1), ts(2020, 1, 2), ts(2020, 1, 3)]);

    Ok(())
}

/// Declaring a derived stream whose dependency was never mentioned in an
/// existing space is rejected with `UnknownDependency` at declaration time,
/// not deferred to query time.
#[test]
fn unknown_dependency_rejected_at_declaration() -> anyhow::Result<()> {
    let mut state = State::new("id", "date", BTreeMap::new());
    state.add(row(1, ts(2020, 1, 1), &[("amount", Value::Int(1))]))?;

    let phantom = CalculatedStream::dependency("never_mentioned", Dtype::Integer);
    let err = state.declare("derived", phantom).unwrap_err();
    assert!(matches!(err, stateful::StatefulError::UnknownDependency { .. }));
    Ok(())
}
