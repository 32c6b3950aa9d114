use proptest::prelude::*;
use traj_core::TrajError;
use traj_tree::{NodeId, NodeSpec, Tree};

fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string)
}

fn dotted(max_depth: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=max_depth).prop_map(|parts| parts.join("."))
}

fn outcome(tree: &Tree, query: &str) -> Result<String, &'static str> {
    match tree.resolve(query) {
        Ok(id) => Ok(tree.full_path(id)),
        Err(err) => Err(err.family()),
    }
}

proptest! {
    #[test]
    fn resolution_is_deterministic_across_rebuilds(
        paths in prop::collection::vec(dotted(4), 1..12),
        queries in prop::collection::vec(dotted(3), 1..8),
    ) {
        let mut tree = Tree::new();
        for (idx, path) in paths.iter().enumerate() {
            // Prefix clashes between leaves and groups are legitimately rejected.
            let _ = tree.add_path(path, NodeSpec::parameter(idx as i64));
        }
        let rebuilt = Tree::from_records(tree.to_records(NodeId::ROOT)).expect("rebuild");

        for query in &queries {
            let first = outcome(&tree, query);
            prop_assert_eq!(&first, &outcome(&tree, query));
            prop_assert_eq!(&first, &outcome(&rebuilt, query));
            if let Some(id) = tree.lookup(query) {
                prop_assert_eq!(first, Ok(tree.full_path(id)));
            }
        }
    }
}

#[test]
fn ambiguous_suffix_lists_candidates_in_creation_order() {
    let mut tree = Tree::new();
    tree.add_path("results.runs.run_00000001.energy", NodeSpec::group())
        .expect("first");
    tree.add_path("results.runs.run_00000000.energy", NodeSpec::group())
        .expect("second");

    let err = tree.resolve("energy").expect_err("ambiguous");
    match err {
        TrajError::AmbiguousPath(info) => assert_eq!(
            info.context["candidates"],
            "results.runs.run_00000001.energy, results.runs.run_00000000.energy"
        ),
        other => panic!("unexpected error {other}"),
    }
    let id = tree
        .resolve("run_00000000.energy")
        .expect("qualified suffix");
    assert_eq!(tree.full_path(id), "results.runs.run_00000000.energy");
}

#[test]
fn tree_serializes_as_records() {
    let mut tree = Tree::new();
    tree.add_path("parameters.x", NodeSpec::parameter(3).with_comment("x axis"))
        .expect("add");
    let bytes = traj_core::to_message_bytes(&tree).expect("encode");
    let decoded: Tree = traj_core::from_message_bytes(&bytes).expect("decode");
    let x = decoded.resolve("x").expect("resolve");
    assert_eq!(decoded.node(x).expect("node").comment(), "x axis");
}
