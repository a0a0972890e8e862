#![allow(missing_docs)]

use sonda::{
    Aggregate, AggregateState, Action, CompareOp, Condition, EngineOptions, MemTable, PredicateTree, Result, Session,
    Value, ValueKind,
};

#[test]
fn float_sum_widens_to_double() -> Result<()> {
    let mut table = MemTable::with_leaf_size(2)?;
    let price = table.add_float_column("price", vec![0.1, 0.2, 0.3, 1e-8, 1e8])?;
    let flag = table.add_bool_column("flag", vec![true, true, false, true, true])?;
    let tree = PredicateTree::single(Condition::int(flag, CompareOp::Equal, 1));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    let expected = f64::from(0.1f32) + f64::from(0.2f32) + f64::from(1e-8f32) + f64::from(1e8f32);
    match session.sum(price, ..)? {
        Value::Double(sum) => assert_eq!(sum, expected),
        other => panic!("expected a double sum, got {other:?}"),
    }
    Ok(())
}

#[test]
fn min_max_skip_nulls() -> Result<()> {
    let mut table = MemTable::with_leaf_size(3)?;
    let score = table.add_nullable_int_column("score", vec![None, Some(4), Some(-2), None, Some(9), Some(3)])?;
    let temp = table.add_nullable_double_column("temp", vec![Some(1.5), None, Some(-0.5), Some(7.25), None, None])?;
    let tree = PredicateTree::new();
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.min(score, ..)?, Some(Value::Int(-2)));
    assert_eq!(session.max(score, ..)?, Some(Value::Int(9)));
    assert_eq!(session.min(temp, ..)?, Some(Value::Double(-0.5)));
    assert_eq!(session.max(temp, ..)?, Some(Value::Double(7.25)));
    assert_eq!(session.max(score, 0..1)?, None);
    assert_eq!(session.sum(score, ..)?, Value::Int(14));
    Ok(())
}

#[test]
fn average_counts_only_non_null_values() -> Result<()> {
    let mut table = MemTable::new();
    let age = table.add_nullable_int_column("age", vec![Some(10), None, Some(20), Some(40), None])?;
    let kind = table.add_int_column("kind", vec![1, 1, 1, 2, 1])?;
    let tree = PredicateTree::single(Condition::int(kind, CompareOp::Equal, 1));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.average(age, ..)?, Some(15.0));
    assert_eq!(session.count(.., usize::MAX)?, 4);
    assert_eq!(session.average(age, 4..)?, None);
    Ok(())
}

#[test]
fn fused_integer_path_matches_generic_path() -> Result<()> {
    let values: Vec<i64> = (0..5000).map(|i| (i * 7919) % 101 - 50).collect();
    let mut table = MemTable::with_leaf_size(64)?;
    let v = table.add_int_column("v", values.clone())?;
    let w = table.add_int_column("w", values.iter().map(|x| x * 2).collect())?;
    let tree = PredicateTree::single(Condition::int(v, CompareOp::Greater, 10));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;

    let matching: Vec<i64> = values.iter().copied().filter(|&x| x > 10).collect();
    // Same column as the condition: fused scan and fold.
    assert_eq!(session.sum(v, ..)?, Value::Int(matching.iter().sum()));
    assert_eq!(session.max(v, ..)?, matching.iter().max().map(|&m| Value::Int(m)));
    // Different source column: generic path with a payload cursor.
    assert_eq!(session.sum(w, ..)?, Value::Int(matching.iter().map(|x| x * 2).sum()));
    assert_eq!(session.min(w, ..)?, matching.iter().min().map(|&m| Value::Int(m * 2)));
    Ok(())
}

#[test]
fn integer_sum_wraps_on_overflow() -> Result<()> {
    let mut table = MemTable::new();
    let big = table.add_int_column("big", vec![i64::MAX, 1, 1])?;
    let tree = PredicateTree::new();
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.sum(big, ..)?, Value::Int(i64::MIN.wrapping_add(1)));
    Ok(())
}

#[test]
fn aggregate_kind_must_match_source() -> Result<()> {
    let mut table = MemTable::new();
    let v = table.add_int_column("v", vec![1, 2, 3])?;
    let tree = PredicateTree::new();
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    let mut state = AggregateState::new(Action::Sum, Some(ValueKind::Double), usize::MAX)?;
    assert!(session.aggregate(&mut state, .., Some(v)).is_err());

    let mut state = AggregateState::new(Action::Min, Some(ValueKind::Int), usize::MAX)?;
    session.aggregate(&mut state, 1.., Some(v))?;
    assert_eq!(state.finish(), Aggregate::Min(Some(Value::Int(2))));
    assert!(AggregateState::new(Action::Max, None, 1).is_err());
    Ok(())
}
