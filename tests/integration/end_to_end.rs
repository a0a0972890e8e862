#![allow(missing_docs)]

use std::io::Write;
use std::sync::Once;

use sonda::{
    Aggregate, AggregateState, Action, CompareOp, Condition, EngineOptions, MemTable, PredicateTree, Result,
    Session, SondaError, StringOp, Value, ValueKind,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn people() -> Result<(MemTable, sonda::ColumnId, sonda::ColumnId)> {
    let mut table = MemTable::new();
    let age = table.add_int_column("age", vec![10, 25, 7, 40, 25])?;
    let name = table.add_string_column("name", ["ann", "Bob", "cid", "bob", "eve"])?;
    Ok((table, age, name))
}

#[test]
fn equality_count_and_sum() -> Result<()> {
    init_tracing();
    let (table, age, _) = people()?;
    let tree = PredicateTree::single(Condition::int(age, CompareOp::Equal, 25));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![1, 4]);
    assert_eq!(session.count(.., usize::MAX)?, 2);
    assert_eq!(session.sum(age, ..)?, Value::Int(50));
    assert_eq!(session.find_first(..)?, Some(1));
    assert_eq!(session.find_first(2..)?, Some(4));
    assert_eq!(session.find_first(2..4)?, None);
    Ok(())
}

#[test]
fn or_of_two_ranges() -> Result<()> {
    init_tracing();
    let (table, age, _) = people()?;
    let mut tree = PredicateTree::new();
    let old = tree.push(Condition::int(age, CompareOp::Greater, 20));
    let young = tree.push(Condition::int(age, CompareOp::Less, 8));
    let or = tree.push(Condition::or([old, young]));
    tree.set_root(or);
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn negated_equality() -> Result<()> {
    init_tracing();
    let (table, age, _) = people()?;
    let mut tree = PredicateTree::new();
    let eq = tree.push(Condition::int(age, CompareOp::Equal, 25));
    let not = tree.push(Condition::not(eq));
    tree.set_root(not);
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![0, 2, 3]);
    Ok(())
}

#[test]
fn and_chain_with_case_insensitive_string() -> Result<()> {
    init_tracing();
    let (table, age, name) = people()?;
    let mut tree = PredicateTree::new();
    let bob = tree.push(Condition::string_ci(name, StringOp::Equal, "BOB"));
    let adult = tree.push(Condition::int(age, CompareOp::GreaterEqual, 30));
    let root = tree.chain(&[bob, adult]).expect("non-empty chain");
    tree.set_root(root);
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![3]);

    let mut tree = PredicateTree::new();
    let b = tree.push(Condition::string(name, StringOp::BeginsWith, "b"));
    tree.set_root(b);
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![3]);
    Ok(())
}

#[test]
fn indexed_string_lookup() -> Result<()> {
    init_tracing();
    let mut table = MemTable::new();
    let city = table.add_string_column("city", ["oslo", "rome", "oslo", "lima", "oslo", "rome"])?;
    let pop = table.add_int_column("pop", vec![1, 2, 3, 4, 5, 6])?;
    table.add_search_index(city)?;
    let mut tree = PredicateTree::new();
    let oslo = tree.push(Condition::string(city, StringOp::Equal, "oslo"));
    let big = tree.push(Condition::int(pop, CompareOp::Greater, 1));
    let root = tree.chain(&[big, oslo]).expect("non-empty chain");
    tree.set_root(root);
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![2, 4]);

    let lima = PredicateTree::single(Condition::string(city, StringOp::Equal, "lima"));
    let mut session = Session::new(&lima, &table, &EngineOptions::default())?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![3]);

    let none = PredicateTree::single(Condition::string(city, StringOp::Equal, "paris"));
    let mut session = Session::new(&none, &table, &EngineOptions::default())?;
    assert_eq!(session.count(.., usize::MAX)?, 0);
    Ok(())
}

#[test]
fn explicit_aggregate_state() -> Result<()> {
    init_tracing();
    let (table, age, _) = people()?;
    let tree = PredicateTree::single(Condition::int(age, CompareOp::Greater, 9));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;

    let mut state = AggregateState::new(Action::Max, Some(ValueKind::Int), usize::MAX)?;
    session.aggregate(&mut state, .., Some(age))?;
    assert_eq!(state.finish(), Aggregate::Max(Some(Value::Int(40))));

    let mut state = AggregateState::new(Action::Count, None, 2)?;
    session.aggregate(&mut state, .., None)?;
    assert_eq!(state.finish(), Aggregate::Count(2));

    let mut state = AggregateState::new(Action::Sum, Some(ValueKind::Int), usize::MAX)?;
    assert!(matches!(
        session.aggregate(&mut state, .., None),
        Err(SondaError::Invalid(_))
    ));
    Ok(())
}

#[test]
fn callback_stops_early() -> Result<()> {
    init_tracing();
    let (table, age, _) = people()?;
    let tree = PredicateTree::single(Condition::int(age, CompareOp::Greater, 0));
    let mut session = Session::new(&tree, &table, &EngineOptions::default())?;
    let mut seen = Vec::new();
    let delivered = session.for_each_match(.., |row| {
        seen.push(row);
        row < 2
    })?;
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(delivered, 3);
    Ok(())
}

#[test]
fn options_loaded_from_file() -> Result<()> {
    init_tracing();
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "[engine]\nfind_locals = 2\nprobe_matches = 1\nbest_dist = 3\nsegment_rows = 5")
        .expect("write config");
    let options = EngineOptions::load(file.path()).expect("valid config");
    assert_eq!(options.find_locals, 2);
    assert_eq!(options.segment_rows, 5);
    assert_eq!(options.time_unit, EngineOptions::default().time_unit);

    let mut table = MemTable::with_leaf_size(4)?;
    let a = table.add_int_column("a", (0..40).map(|i| i % 3).collect())?;
    let b = table.add_int_column("b", (0..40).map(|i| i % 5).collect())?;
    let mut tree = PredicateTree::new();
    let x = tree.push(Condition::int(a, CompareOp::Equal, 0));
    let y = tree.push(Condition::int(b, CompareOp::Equal, 0));
    let root = tree.chain(&[x, y]).expect("non-empty chain");
    tree.set_root(root);
    let mut session = Session::new(&tree, &table, &options)?;
    assert_eq!(session.find_all(.., usize::MAX)?, vec![0, 15, 30]);
    Ok(())
}

#[test]
fn invalid_options_are_rejected() {
    let err = EngineOptions::from_toml_str("[engine]\nprobe_matches = 0").unwrap_err();
    assert!(err.to_string().contains("probe_matches"));
}

#[test]
fn hand_built_options_are_checked_before_scanning() -> Result<()> {
    init_tracing();
    let mut table = MemTable::new();
    let tag = table.add_string_column("tag", ["a", "b", "a"])?;
    let tree = PredicateTree::single(Condition::string(tag, StringOp::Equal, "a"));
    let options = EngineOptions {
        find_locals: 0,
        ..EngineOptions::default()
    };
    let err = Session::new(&tree, &table, &options).err().expect("zero find_locals");
    assert!(err.to_string().contains("find_locals"));

    let options = EngineOptions {
        probe_matches: 0,
        ..EngineOptions::default()
    };
    assert!(matches!(
        Session::new(&tree, &table, &options),
        Err(SondaError::Config(_))
    ));
    Ok(())
}
