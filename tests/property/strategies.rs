//! Generators shared by the property tests: random call graphs and random
//! linear procedures with suspension points.

use proptest::prelude::*;

use weft::names::{MethodId, MethodSig};
use weft::proc::{ArithOp, DispatchKind, Module, ProcBuilder, ProcFlags, ValueKind};

use crate::common;

/// A random sealed static call graph plus park markers, with ground-truth
/// suspendability derivable by reachability.
#[derive(Debug, Clone)]
pub struct CallGraph {
    /// `edges[i][j]` (j < i): procedure i calls procedure j.
    pub edges: Vec<Vec<bool>>,
    /// Procedure i contains a direct park call.
    pub parks: Vec<bool>,
}

impl CallGraph {
    pub fn len(&self) -> usize {
        self.parks.len()
    }

    /// Reachability ground truth: i may suspend iff it parks or can reach
    /// a procedure that parks.
    pub fn ground_truth(&self) -> Vec<bool> {
        let n = self.len();
        let mut truth = self.parks.clone();
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..n {
                if truth[i] {
                    continue;
                }
                if (0..i).any(|j| self.edges[i][j] && truth[j]) {
                    truth[i] = true;
                    changed = true;
                }
            }
        }
        truth
    }

    /// Materialize as a module; returns the method ids in index order.
    pub fn build(&self, module: &mut Module) -> Vec<MethodId> {
        let park = common::prims(module).park;
        let ids: Vec<MethodId> = (0..self.len())
            .map(|i| module.method("gen/G", &format!("p{}", i), MethodSig::void()))
            .collect();
        for i in 0..self.len() {
            let mut b = ProcBuilder::new(ids[i], ProcFlags::statik());
            for j in 0..i {
                if self.edges[i][j] {
                    b = b.call(ids[j], DispatchKind::Static);
                }
            }
            if self.parks[i] {
                b = b.call(park, DispatchKind::Static);
            }
            module.insert(b.ret(None).build().unwrap());
        }
        ids
    }
}

pub fn arb_call_graph() -> impl Strategy<Value = CallGraph> {
    (2usize..10).prop_flat_map(|n| {
        let rows: Vec<_> = (0..n)
            .map(|i| proptest::collection::vec(any::<bool>(), i))
            .collect();
        (rows, proptest::collection::vec(any::<bool>(), n))
            .prop_map(|(edges, parks)| CallGraph { edges, parks })
    })
}

/// One step of a random linear integer program. Preconditions that do not
/// hold at build time degrade the step to a plain push, keeping every
/// generated sequence well-formed.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Push(i8),
    Dup,
    Pop,
    Add,
    Store(u8),
    Load(u8),
    Park,
}

pub fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        any::<i8>().prop_map(Step::Push),
        Just(Step::Dup),
        Just(Step::Pop),
        Just(Step::Add),
        (0u8..4).prop_map(Step::Store),
        (0u8..4).prop_map(Step::Load),
        Just(Step::Park),
    ];
    proptest::collection::vec(step, 1..40)
}

/// Assemble the steps into a procedure that prints one final integer.
/// Returns the entry id and how many parks were emitted.
pub fn build_linear(module: &mut Module, name: &str, steps: &[Step]) -> (MethodId, usize) {
    let park = common::prims(module).park;
    let io = common::printers(module);
    let entry = module.method("gen/L", name, MethodSig::void());

    let mut b = ProcBuilder::new(entry, ProcFlags::statik()).locals(4);
    let mut depth = 0usize;
    let mut init = [false; 4];
    let mut parks = 0usize;

    for step in steps {
        match *step {
            Step::Push(v) => {
                b = b.push_int(v as i32);
                depth += 1;
            }
            Step::Dup if depth >= 1 => {
                b = b.dup();
                depth += 1;
            }
            Step::Pop if depth >= 1 => {
                b = b.pop();
                depth -= 1;
            }
            Step::Add if depth >= 2 => {
                b = b.arith(ValueKind::Int, ArithOp::Add);
                depth -= 1;
            }
            Step::Store(slot) if depth >= 1 => {
                b = b.store(ValueKind::Int, slot as u16);
                init[slot as usize] = true;
                depth -= 1;
            }
            Step::Load(slot) if init[slot as usize] => {
                b = b.load(ValueKind::Int, slot as u16);
                depth += 1;
            }
            Step::Park => {
                b = b.call(park, DispatchKind::Static);
                parks += 1;
            }
            // Precondition failed: degrade to a push.
            _ => {
                b = b.push_int(1);
                depth += 1;
            }
        }
    }

    // Collapse whatever is left into one printable value.
    while depth >= 2 {
        b = b.arith(ValueKind::Int, ArithOp::Add);
        depth -= 1;
    }
    if depth == 0 {
        b = b.push_int(0);
    }
    b = b.call(io.print_int, DispatchKind::Static);
    module.insert(b.ret(None).build().unwrap());
    (entry, parks)
}
