#![cfg(test)]

// Property tests for SortedSet kept inside the crate so they can use the
// same validators the unit tests use.

use crate::sorted_set::{AddOutcome, SortedSet};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hasher};

// Pool-indexed operations: indices shrink to earlier names, and scores come
// from a small range so ties (and name tiebreaks) are common.
#[derive(Clone, Debug)]
enum OpI {
    Add(usize, i8),
    Pop(usize),
    Lookup(usize),
    Rank(usize),
    Query(i8, usize, i64),
    Count(i8, i8),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<OpI>)> {
    proptest::collection::vec(proptest::collection::vec(b'a'..=b'd', 0..4), 1..=10).prop_flat_map(
        |pool| {
            let idxs: Vec<usize> = (0..pool.len()).collect();
            let idx = proptest::sample::select(idxs);
            let op = prop_oneof![
                4 => (idx.clone(), -3i8..=3).prop_map(|(i, s)| OpI::Add(i, s)),
                2 => idx.clone().prop_map(OpI::Pop),
                1 => idx.clone().prop_map(OpI::Lookup),
                1 => idx.clone().prop_map(OpI::Rank),
                1 => (-4i8..=4, idx.clone(), -3i64..=3).prop_map(|(s, i, o)| OpI::Query(s, i, o)),
                1 => (-4i8..=4, -4i8..=4).prop_map(|(l, h)| OpI::Count(l, h)),
                1 => Just(OpI::Iterate),
            ];
            proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
        },
    )
}

// Model order: score, then name bytes (Vec<u8> orders exactly like the set).
fn ordered(model: &BTreeMap<Vec<u8>, f64>) -> Vec<(f64, Vec<u8>)> {
    let mut v: Vec<_> = model.iter().map(|(n, &s)| (s, n.clone())).collect();
    v.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    v
}

fn check_against_model<S: BuildHasher>(
    sut: &mut SortedSet<S>,
    pool: &[Vec<u8>],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
    for op in ops {
        match op {
            OpI::Add(i, s) => {
                let name = &pool[i];
                let outcome = sut.add(name, s as f64).unwrap();
                let existed = model.insert(name.clone(), s as f64).is_some();
                let expected = if existed { AddOutcome::Updated } else { AddOutcome::Inserted };
                prop_assert_eq!(outcome, expected);
            }
            OpI::Pop(i) => {
                let name = &pool[i];
                let got = sut.pop(name).map(|m| (m.name().to_vec(), m.score()));
                let want = model.remove(name).map(|s| (name.clone(), s));
                prop_assert_eq!(got, want);
            }
            OpI::Lookup(i) => {
                let name = &pool[i];
                let got = sut.lookup(name).map(|m| m.score());
                prop_assert_eq!(got, model.get(name).copied());
            }
            OpI::Rank(i) => {
                let name = &pool[i];
                let want = ordered(&model)
                    .iter()
                    .position(|(_, n)| n == name)
                    .map_or(0, |p| p + 1);
                prop_assert_eq!(sut.rank(name), want);
            }
            OpI::Query(s, i, offset) => {
                let (score, name) = (s as f64, &pool[i]);
                let order = ordered(&model);
                let start = order.partition_point(|(ms, mn)| {
                    *ms < score || (*ms == score && mn.as_slice() < name.as_slice())
                });
                let want = if start < order.len() {
                    usize::try_from(start as i64 + offset)
                        .ok()
                        .and_then(|j| order.get(j))
                        .map(|(_, n)| n.clone())
                } else {
                    None
                };
                let got = sut.query(score, name, offset).map(|m| m.name().to_vec());
                prop_assert_eq!(got, want);
            }
            OpI::Count(low, high) => {
                let want = model
                    .values()
                    .filter(|&&s| s >= low as f64 && s < high as f64)
                    .count();
                prop_assert_eq!(sut.count(low as i64, high as i64), want);
            }
            OpI::Iterate => {
                let got: Vec<_> = sut.iter().map(|m| (m.score(), m.name().to_vec())).collect();
                prop_assert_eq!(got, ordered(&model));
            }
        }

        // Post-conditions after each op
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.validate(), Ok(()));
    }
    Ok(())
}

// Property: state-machine equivalence against a BTreeMap model.
// Invariants exercised across random operation sequences:
// - add reports Inserted/Updated exactly as the model does.
// - lookup/pop agree with the model; popped members carry their last score.
// - rank, query (with signed offsets) and count match the model order.
// - validate() holds after every op (balance, order, dual reachability).
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut = SortedSet::new();
        check_against_model(&mut sut, &pool, ops)?;
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: same state machine with every name in one hash chain, which
// stresses equality probing in the index.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let mut sut = SortedSet::with_hasher(ConstBuildHasher);
        check_against_model(&mut sut, &pool, ops)?;
    }
}
