#![allow(missing_docs)]

use std::thread;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sonda::storage::shared;
use sonda::{CompareOp, Condition, EngineOptions, MemTable, PredicateTree, Result, Session, SharedTable, StringOp};

const ROWS: usize = 4000;
const WORKERS: usize = 4;

fn fixture() -> Result<(SharedTable, PredicateTree, Vec<usize>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(0x50_4e_44_41);
    let amounts: Vec<i64> = (0..ROWS).map(|_| rng.gen_range(0..1000)).collect();
    let regions: Vec<&str> = (0..ROWS)
        .map(|_| ["north", "south", "east", "west"][rng.gen_range(0..4)])
        .collect();

    let mut table = MemTable::with_leaf_size(128)?;
    let amount = table.add_int_column("amount", amounts.clone())?;
    let region = table.add_string_column("region", regions.iter().copied())?;

    let mut tree = PredicateTree::new();
    let large = tree.push(Condition::int(amount, CompareOp::GreaterEqual, 900));
    let north = tree.push(Condition::string(region, StringOp::Equal, "north"));
    let south = tree.push(Condition::string(region, StringOp::Equal, "south"));
    let either = tree.push(Condition::or([north, south]));
    let root = tree.chain(&[large, either]).expect("chain");
    tree.set_root(root);

    let expected = (0..ROWS)
        .filter(|&row| amounts[row] >= 900 && matches!(regions[row], "north" | "south"))
        .collect();
    Ok((shared(table), tree, expected))
}

#[test]
fn sessions_on_worker_threads_agree() -> Result<()> {
    let (table, tree, expected) = fixture()?;
    let chunk = ROWS / WORKERS;
    let results: Vec<Vec<usize>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let table = SharedTable::clone(&table);
                let tree = &tree;
                scope.spawn(move || {
                    let guard = table.read_arc();
                    let mut session = Session::new(tree, &*guard, &EngineOptions::default())?;
                    session.find_all(worker * chunk..(worker + 1) * chunk, usize::MAX)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect::<Result<_>>()
    })?;
    let merged: Vec<usize> = results.into_iter().flatten().collect();
    assert_eq!(merged, expected);
    Ok(())
}

#[test]
fn cloned_trees_evaluate_independently() -> Result<()> {
    let (table, tree, expected) = fixture()?;
    let root = tree.root().expect("root");
    thread::scope(|scope| {
        for _ in 0..WORKERS {
            let copy = tree.clone_subtree(root).expect("valid tree");
            let table = table.clone();
            let expected = &expected;
            scope.spawn(move || {
                let guard = table.read();
                let mut session = Session::new(&copy, &*guard, &EngineOptions::default()).expect("bind");
                assert_eq!(session.count(.., usize::MAX).expect("count"), expected.len());
                assert_eq!(session.find_first(..).expect("first"), expected.first().copied());
            });
        }
    });
    Ok(())
}

#[test]
fn index_added_under_write_lock_keeps_results() -> Result<()> {
    let (table, tree, expected) = fixture()?;
    let before = {
        let guard = table.read();
        let mut session = Session::new(&tree, &*guard, &EngineOptions::default())?;
        session.find_all(.., usize::MAX)?
    };
    {
        let mut guard = table.write();
        let region = guard.column_by_name("region").expect("region column");
        guard.add_search_index(region)?;
    }
    let guard = table.read();
    let after = Session::new(&tree, &*guard, &EngineOptions::default())?.find_all(.., usize::MAX)?;
    assert_eq!(before, expected);
    assert_eq!(after, expected);
    Ok(())
}
