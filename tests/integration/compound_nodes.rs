#![allow(missing_docs)]

use sonda::query::TreeError;
use sonda::{
    BinaryOp, ColumnId, CompareOp, Condition, EngineOptions, MemTable, PredicateTree, Result, Session, SondaError,
    StringOp, TableSource,
};

fn orders() -> Result<MemTable> {
    let mut line_a = MemTable::new();
    line_a.add_int_column("qty", vec![1, 2])?;
    line_a.add_string_column("sku", ["pen", "ink"])?;
    let mut line_b = MemTable::new();
    line_b.add_int_column("qty", vec![20])?;
    line_b.add_string_column("sku", ["pad"])?;
    let mut line_c = MemTable::new();
    line_c.add_int_column("qty", vec![5, 30, 2])?;
    line_c.add_string_column("sku", ["ink", "ink", "pen"])?;

    let mut table = MemTable::with_leaf_size(2)?;
    table.add_int_column("id", vec![100, 101, 102, 103, 104])?;
    table.add_subtable_column("lines", vec![Some(line_a), Some(line_b), None, Some(line_c), None])?;
    table.add_link_column("customer", vec![Some(7), None, Some(3), Some(7), Some(1)])?;
    table.add_link_list_column("tags", vec![vec![1, 2], vec![], vec![2], vec![3, 1], vec![1]])?;
    table.add_binary_column(
        "blob",
        vec![b"\x00\x01".to_vec(), b"abc".to_vec(), vec![], b"xabcx".to_vec(), b"ab".to_vec()],
    )?;
    Ok(table)
}

fn run(tree: &PredicateTree, table: &MemTable) -> Result<Vec<usize>> {
    let mut session = Session::new(tree, table, &EngineOptions::default())?;
    session.find_all(.., usize::MAX)
}

#[test]
fn subtable_with_and_chain() -> Result<()> {
    let table = orders()?;
    let lines = table.column_by_name("lines").expect("lines column");
    let mut tree = PredicateTree::new();
    let qty = tree.push(Condition::int(ColumnId(0), CompareOp::Greater, 10));
    let ink = tree.push(Condition::string(ColumnId(1), StringOp::Equal, "ink"));
    let inner = tree.chain(&[qty, ink]).expect("inner chain");
    let sub = tree.push(Condition::subtable(lines, inner));
    tree.set_root(sub);
    assert_eq!(run(&tree, &table)?, vec![3]);
    Ok(())
}

#[test]
fn subtable_inside_or_and_not() -> Result<()> {
    let table = orders()?;
    let id = table.column_by_name("id").expect("id column");
    let lines = table.column_by_name("lines").expect("lines column");
    let mut tree = PredicateTree::new();
    let pen = tree.push(Condition::string(ColumnId(1), StringOp::Equal, "pen"));
    let has_pen = tree.push(Condition::subtable(lines, pen));
    let last = tree.push(Condition::int(id, CompareOp::Equal, 104));
    let or = tree.push(Condition::or([has_pen, last]));
    tree.set_root(or);
    assert_eq!(run(&tree, &table)?, vec![0, 3, 4]);

    let mut tree = PredicateTree::new();
    let pen = tree.push(Condition::string(ColumnId(1), StringOp::Equal, "pen"));
    let has_pen = tree.push(Condition::subtable(lines, pen));
    let not = tree.push(Condition::not(has_pen));
    tree.set_root(not);
    assert_eq!(run(&tree, &table)?, vec![1, 2, 4]);
    Ok(())
}

#[test]
fn links_and_link_lists() -> Result<()> {
    let table = orders()?;
    let customer = table.column_by_name("customer").expect("customer column");
    let tags = table.column_by_name("tags").expect("tags column");
    assert_eq!(table.resolve_single_link(customer, 2), Some(3));
    assert_eq!(table.resolve_single_link(customer, 1), None);

    let tree = PredicateTree::single(Condition::links_to(customer, 7));
    assert_eq!(run(&tree, &table)?, vec![0, 3]);

    let tree = PredicateTree::single(Condition::links_to(tags, 1));
    assert_eq!(run(&tree, &table)?, vec![0, 3, 4]);

    let mut tree = PredicateTree::new();
    let seven = tree.push(Condition::links_to(customer, 7));
    let tagged = tree.push(Condition::links_to(tags, 3));
    let root = tree.chain(&[seven, tagged]).expect("chain");
    tree.set_root(root);
    assert_eq!(run(&tree, &table)?, vec![3]);
    Ok(())
}

#[test]
fn binary_operators() -> Result<()> {
    let table = orders()?;
    let blob = table.column_by_name("blob").expect("blob column");
    let tree = PredicateTree::single(Condition::binary(blob, BinaryOp::Contains, b"abc".to_vec()));
    assert_eq!(run(&tree, &table)?, vec![1, 3]);
    let tree = PredicateTree::single(Condition::binary(blob, BinaryOp::BeginsWith, b"ab".to_vec()));
    assert_eq!(run(&tree, &table)?, vec![1, 4]);
    let tree = PredicateTree::single(Condition::binary(blob, BinaryOp::Equal, Vec::new()));
    assert_eq!(run(&tree, &table)?, vec![2]);
    Ok(())
}

#[test]
fn two_column_comparison() -> Result<()> {
    let mut table = MemTable::with_leaf_size(3)?;
    let low = table.add_int_column("low", vec![1, 5, 3, 0, 9, 4, 0])?;
    let high = table.add_int_column("high", vec![2, 5, 1, 0, 10, 2, 0])?;
    let tree = PredicateTree::single(Condition::two_columns(low, CompareOp::Less, high));
    assert_eq!(run(&tree, &table)?, vec![0, 4]);
    let tree = PredicateTree::single(Condition::two_columns(low, CompareOp::Equal, high));
    assert_eq!(run(&tree, &table)?, vec![1, 3, 6]);

    let real = table.add_double_column("real", vec![1.5; 7])?;
    let tree = PredicateTree::single(Condition::two_columns(low, CompareOp::Less, real));
    assert!(matches!(
        Session::new(&tree, &table, &EngineOptions::default()),
        Err(SondaError::ColumnType { .. })
    ));
    Ok(())
}

#[test]
fn row_set_and_expression() -> Result<()> {
    let table = orders()?;
    let id = table.column_by_name("id").expect("id column");
    let mut tree = PredicateTree::new();
    let set = tree.push(Condition::row_set([4, 1, 3, 1]));
    let odd = tree.push(Condition::matching(move |table: &dyn TableSource, row| {
        let (leaf, start) = table.leaf(id, row);
        leaf.value(row - start).and_then(|v| v.as_i64()).is_some_and(|v| v % 2 == 1)
    }));
    let root = tree.chain(&[set, odd]).expect("chain");
    tree.set_root(root);
    assert_eq!(run(&tree, &table)?, vec![1, 3]);
    Ok(())
}

#[test]
fn enum_strings_case_insensitive() -> Result<()> {
    let mut table = MemTable::with_leaf_size(2)?;
    let color = table.add_enum_column("color", ["Red", "blue", "RED", "green", "red"])?;
    let tree = PredicateTree::single(Condition::string_ci(color, StringOp::Equal, "red"));
    assert_eq!(run(&tree, &table)?, vec![0, 2, 4]);
    let tree = PredicateTree::single(Condition::string(color, StringOp::Equal, "red"));
    assert_eq!(run(&tree, &table)?, vec![4]);
    let tree = PredicateTree::single(Condition::string_ci(color, StringOp::Contains, "E"));
    assert_eq!(run(&tree, &table)?, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn structural_errors_are_reported() -> Result<()> {
    let table = orders()?;
    let id = table.column_by_name("id").expect("id column");

    let mut tree = PredicateTree::new();
    let only = tree.push(Condition::int(id, CompareOp::Equal, 1));
    let or = tree.push(Condition::or([only]));
    tree.set_root(or);
    assert!(matches!(
        Session::new(&tree, &table, &EngineOptions::default()),
        Err(SondaError::InvalidTree(TreeError::OrTooFewOperands))
    ));

    let mut tree = PredicateTree::new();
    let a = tree.push(Condition::int(id, CompareOp::Equal, 1));
    let b = tree.push(Condition::int(id, CompareOp::Equal, 2));
    let or = tree.push(Condition::Or {
        branches: vec![Some(a), None, Some(b)],
    });
    tree.set_root(or);
    let err = Session::new(&tree, &table, &EngineOptions::default()).err().expect("missing branch");
    assert_eq!(err.to_string(), "invalid predicate tree: Missing operand 1 of OR");

    let mut tree = PredicateTree::new();
    let name = tree.push(Condition::string(id, StringOp::Equal, vec![0xff, 0xfe]));
    tree.set_root(name);
    assert!(matches!(
        Session::new(&tree, &table, &EngineOptions::default()),
        Err(SondaError::InvalidTree(TreeError::MalformedUtf8(_)))
    ));

    let mut tree = PredicateTree::new();
    let shared = tree.push(Condition::int(id, CompareOp::Equal, 1));
    let left = tree.push(Condition::not(shared));
    let right = tree.push(Condition::not(shared));
    let root = tree.chain(&[left, right]).expect("chain");
    tree.set_root(root);
    assert!(matches!(
        Session::new(&tree, &table, &EngineOptions::default()),
        Err(SondaError::InvalidTree(TreeError::SharedNode(_)))
    ));
    Ok(())
}

#[test]
fn cloned_subtree_evaluates_like_its_source() -> Result<()> {
    let table = orders()?;
    let id = table.column_by_name("id").expect("id column");
    let lines = table.column_by_name("lines").expect("lines column");
    let mut tree = PredicateTree::new();
    let big = tree.push(Condition::int(ColumnId(0), CompareOp::GreaterEqual, 20));
    let sub = tree.push(Condition::subtable(lines, big));
    let early = tree.push(Condition::int(id, CompareOp::Less, 103));
    let not = tree.push(Condition::not(early));
    let or = tree.push(Condition::or([sub, not]));
    tree.set_root(or);

    let copy = tree.clone_subtree(or)?;
    assert_eq!(copy.len(), tree.len());
    assert_eq!(run(&copy, &table)?, run(&tree, &table)?);
    assert_eq!(run(&copy, &table)?, vec![1, 3, 4]);

    let mut host = PredicateTree::new();
    let first = host.push(Condition::int(id, CompareOp::GreaterEqual, 101));
    let imported = host.import(&tree, or)?;
    let root = host.chain(&[first, imported]).expect("chain");
    host.set_root(root);
    assert_eq!(run(&host, &table)?, vec![1, 3, 4]);
    Ok(())
}
