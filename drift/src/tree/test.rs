use super::*;

fn two_leaf() -> Tree {
    Tree::new(
        "t",
        vec![
            (0, 0, 1_000_000, None),
            (1, 0, 0, Some("Alpha one".to_string())),
            (2, 0, 0, Some("Beta two".to_string())),
        ],
    )
    .unwrap()
}

#[test]
fn builds_and_indexes() {
    let t = two_leaf();
    assert_eq!(t.len(), 3);
    let root = t.node(t.root());
    assert_eq!(root.id, 0);
    assert_eq!(root.children.len(), 2);
    assert!(t.node(t.terminal("Alpha one").unwrap()).is_terminal());
    assert!(t.terminal("Gamma").is_none());
}

#[test]
fn post_order_visits_children_first() {
    let t = Tree::new(
        "t",
        vec![
            (10, 10, 3_000_000, None),
            (20, 10, 2_000_000, None),
            (30, 20, 0, Some("a".to_string())),
            (40, 20, 0, Some("b".to_string())),
            (50, 10, 0, Some("c".to_string())),
        ],
    )
    .unwrap();

    let order = t.post_order();
    assert_eq!(order.len(), 5);
    let place = |at: usize| order.iter().position(|o| *o == at).unwrap();
    for node in 0..t.len() {
        for child in &t.node(node).children {
            assert!(place(*child) < place(node));
        }
    }
    assert_eq!(*order.last().unwrap(), t.root());

    let pre = t.pre_order();
    assert_eq!(pre[0], t.root());
}

#[test]
fn rejects_child_older_than_parent() {
    let r = Tree::new(
        "t",
        vec![(0, 0, 100, None), (1, 0, 200, Some("a".to_string()))],
    );
    assert!(r.is_err());
}

#[test]
fn rejects_two_roots_and_unknown_parent() {
    assert!(Tree::new("t", vec![(0, 0, 10, None), (1, 1, 5, None)]).is_err());
    assert!(Tree::new("t", vec![(0, 0, 10, None), (1, 9, 5, Some("a".to_string()))]).is_err());
}

#[test]
fn read_splits_trees_by_name() {
    let text = "\
tree\tnode\tparent\tage\ttaxon
one\t0\t0\t1000000\t
one\t1\t0\t0\tAlpha
one\t2\t0\t0\tBeta
two\t0\t0\t500000\t
two\t1\t0\t0\tGamma
two\t2\t0\t0\tDelta
";
    let mut r = TsvReader::new("trees.tab".to_string(), text.as_bytes()).unwrap();
    let trees = read(&mut r).unwrap();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[0].name(), "one");
    assert_eq!(trees[1].name(), "two");
    assert_eq!(trees[0].node(trees[0].root()).age, 1_000_000);
}
