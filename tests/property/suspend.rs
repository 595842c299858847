// Property tests for the suspendability analysis.

use proptest::prelude::*;

use weft::analysis::{analyze, propagate_once, AllowList, NeverSuspends};
use weft::proc::Module;

use crate::common;
use crate::property::strategies::{arb_call_graph, CallGraph};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The analysis agrees with plain reachability on sealed static call
    /// graphs: a procedure may suspend iff it can reach a park.
    #[test]
    fn analysis_matches_reachability(graph in arb_call_graph()) {
        let mut m = Module::new();
        let ids = graph.build(&mut m);
        let truth = graph.ground_truth();

        let map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
        for (i, id) in ids.iter().enumerate() {
            prop_assert_eq!(
                map.get(&m, *id).unwrap(),
                truth[i],
                "procedure p{} disagrees with reachability",
                i
            );
        }
    }

    /// Re-running fixed-point propagation on a completed map changes
    /// nothing.
    #[test]
    fn propagation_is_idempotent(graph in arb_call_graph()) {
        let mut m = Module::new();
        graph.build(&mut m);
        let mut map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
        prop_assert!(!propagate_once(&m, &mut map));
        prop_assert!(!propagate_once(&m, &mut map));
    }

    /// Two runs over the same module produce identical verdicts.
    #[test]
    fn analysis_is_deterministic(graph in arb_call_graph()) {
        let mut m = Module::new();
        let ids = graph.build(&mut m);
        let a = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
        let b = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
        for id in ids {
            prop_assert_eq!(a.get(&m, id).unwrap(), b.get(&m, id).unwrap());
        }
    }

    /// The fact map is total over the module.
    #[test]
    fn facts_are_total(graph in arb_call_graph()) {
        let mut m = Module::new();
        let ids = graph.build(&mut m);
        let map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
        for id in ids {
            prop_assert!(map.get(&m, id).is_ok());
        }
    }
}

// Non-random sanity anchor for the generator itself.
#[test]
fn ground_truth_handles_indirect_reachability() {
    let graph = CallGraph {
        edges: vec![vec![], vec![true], vec![false, true]],
        parks: vec![true, false, false],
    };
    assert_eq!(graph.ground_truth(), vec![true, true, true]);

    let mut m = Module::new();
    let _ = common::prims(&mut m);
    let ids = graph.build(&mut m);
    let map = analyze(&m, &AllowList::standard(&m), &NeverSuspends).unwrap();
    assert!(map.get(&m, ids[2]).unwrap());
}
