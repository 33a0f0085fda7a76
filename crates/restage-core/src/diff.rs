//! Keyed sequence diffing.
//!
//! [`diff`] matches two ordered sequences of hashable keys and reports
//! the deletes, inserts, and moves needed to transform one into the
//! other. Matching is by identity only: a key that appears exactly once
//! in both sequences is paired up, and runs of equal neighbors are
//! grown outward from those anchors. The whole computation is a fixed
//! number of linear passes over the inputs, with no recursion and no
//! subsequence alignment.
//!
//! Keys that occur more than once in either sequence are never uniquely
//! matched; whatever correspondence neighbor expansion produces for
//! them is accepted. That behavior is deliberately loose and callers
//! must not depend on which of several equal candidates gets paired.

use std::collections::HashMap;
use std::hash::Hash;

use crate::hash;

/// Result of diffing two keyed sequences.
///
/// Index spaces differ per field: `deleted` holds positions in the old
/// sequence, `inserted` positions in the new sequence, and each
/// `(old, new)` pair in `moved` and `matched` spans both.
///
/// To transform the old sequence into the new one: remove the deleted
/// positions (highest first), insert the new keys at the inserted
/// positions, and relocate each moved pair from its old to its new
/// position. `matched` additionally records the pairs that did not
/// move, which reconcilers use for ordering decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Positions in the old sequence with no counterpart in the new one.
    pub deleted: Vec<usize>,
    /// Positions in the new sequence with no counterpart in the old one.
    pub inserted: Vec<usize>,
    /// Matched pairs whose old and new positions differ.
    pub moved: Vec<(usize, usize)>,
    /// Every matched pair, relocated or not, ordered by new position.
    pub matched: Vec<(usize, usize)>,
}

impl DiffResult {
    /// Returns `true` when the sequences are structurally identical.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.moved.is_empty()
    }
}

/// How often a key occurs in one of the two sequences.
///
/// A tagged variant instead of a counter so the "exactly once" case can
/// carry the occurrence index without a sentinel value.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Counter {
    Zero,
    One(usize),
    Many,
}

impl Counter {
    fn record(&mut self, index: usize) {
        *self = match *self {
            Counter::Zero => Counter::One(index),
            Counter::One(_) | Counter::Many => Counter::Many,
        };
    }
}

/// Per-key occurrence counts across both sequences.
struct Symbol {
    old: Counter,
    new: Counter,
}

/// Per-slot state in the working arrays: still pointing at the symbol
/// table, or resolved to the matching position in the other sequence.
#[derive(Clone, Copy)]
enum Slot {
    Symbol(usize),
    Index(usize),
}

impl Slot {
    fn is_unresolved(&self) -> bool {
        matches!(self, Slot::Symbol(_))
    }
}

/// Diffs `old` against `new` by key identity.
///
/// Runs in O(n) time and memory over the combined input length. See
/// [`DiffResult`] for how to interpret and apply the output.
pub fn diff<K: Hash + Eq>(old: &[K], new: &[K]) -> DiffResult {
    if old.is_empty() && new.is_empty() {
        return DiffResult::default();
    }

    let mut symbols: Vec<Symbol> = Vec::with_capacity(old.len() + new.len());
    let mut table: HashMap<&K, usize, hash::default::BuildHasher> =
        HashMap::with_capacity_and_hasher(old.len() + new.len(), Default::default());

    // Pass 1: count occurrences in `new`, seeding the working array.
    let mut na: Vec<Slot> = Vec::with_capacity(new.len());
    for (j, key) in new.iter().enumerate() {
        let entry = *table.entry(key).or_insert_with(|| {
            symbols.push(Symbol {
                old: Counter::Zero,
                new: Counter::Zero,
            });
            symbols.len() - 1
        });
        symbols[entry].new.record(j);
        na.push(Slot::Symbol(entry));
    }

    // Pass 2: same for `old`.
    let mut oa: Vec<Slot> = Vec::with_capacity(old.len());
    for (i, key) in old.iter().enumerate() {
        let entry = *table.entry(key).or_insert_with(|| {
            symbols.push(Symbol {
                old: Counter::Zero,
                new: Counter::Zero,
            });
            symbols.len() - 1
        });
        symbols[entry].old.record(i);
        oa.push(Slot::Symbol(entry));
    }

    // Pass 3: keys occurring exactly once on both sides are anchors.
    for j in 0..na.len() {
        if let Slot::Symbol(entry) = na[j] {
            if let (Counter::One(i), Counter::One(_)) = (symbols[entry].old, symbols[entry].new) {
                na[j] = Slot::Index(i);
                oa[i] = Slot::Index(j);
            }
        }
    }

    // Pass 4: grow matches forward into equal, still-unresolved neighbors.
    for j in 0..na.len() {
        if let Slot::Index(i) = na[j] {
            let (nj, ni) = (j + 1, i + 1);
            if nj < new.len()
                && ni < old.len()
                && na[nj].is_unresolved()
                && oa[ni].is_unresolved()
                && new[nj] == old[ni]
            {
                na[nj] = Slot::Index(ni);
                oa[ni] = Slot::Index(nj);
            }
        }
    }

    // Pass 5: grow matches backward.
    for j in (0..na.len()).rev() {
        if let Slot::Index(i) = na[j] {
            if j > 0
                && i > 0
                && na[j - 1].is_unresolved()
                && oa[i - 1].is_unresolved()
                && new[j - 1] == old[i - 1]
            {
                na[j - 1] = Slot::Index(i - 1);
                oa[i - 1] = Slot::Index(j - 1);
            }
        }
    }

    // Pass 6: collect.
    let mut result = DiffResult::default();
    for (i, slot) in oa.iter().enumerate() {
        if slot.is_unresolved() {
            result.deleted.push(i);
        }
    }
    for (j, slot) in na.iter().enumerate() {
        match *slot {
            Slot::Symbol(_) => result.inserted.push(j),
            Slot::Index(i) => {
                result.matched.push((i, j));
                if i != j {
                    result.moved.push((i, j));
                }
            }
        }
    }
    result
}
