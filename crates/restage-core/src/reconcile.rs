//! Snapshot reconciliation into a staged changeset.
//!
//! [`reconcile`] composes the keyed diff over section identities with
//! per-section diffs over item identities, reconciles items that moved
//! between sections, and filters matched items through a longest
//! increasing subsequence pass so that items already in relative order
//! are not reported as moves. [`reconcile_items`] is the flat
//! single-section variant, e.g. for a
//! [`TreeSnapshot`](crate::tree::TreeSnapshot)'s visible items
//! flattened into one target section.

use std::hash::Hash;

use crate::changeset::{ItemPosition, StagedChangeset};
use crate::collections::map::{HashMap, HashSet};
use crate::diff;
use crate::snapshot::Snapshot;

/// A matched item pair that survives in both snapshots.
struct Candidate {
    /// Position in the section-mapped old traversal; see
    /// [`reconcile`]'s rank construction.
    rank: usize,
    from: ItemPosition,
    to: ItemPosition,
    /// Whether the item stayed in the same section identity.
    same_section: bool,
}

/// Computes the staged changeset that transforms `old` into `new`.
///
/// Section-level edits come from a single keyed diff over the section
/// identifier lists. Item-level edits come from per-section diffs over
/// sections present on both sides:
///
/// - An item that left a surviving section for another surviving
///   section is one move, never an independent delete plus insert.
/// - Items owned by a deleted or freshly inserted section are covered
///   by the section edit and get no item-level op, except that an item
///   escaping a deleted section into a surviving one is an insert, and
///   one leaving a surviving section for a brand-new one is a delete.
/// - Matched items staying in their section are only reported as moves
///   when they fall outside the longest increasing subsequence of
///   their old traversal ranks, minimizing the number of moves.
///
/// Reload and reconfigure marks of `new` are folded in at new-snapshot
/// coordinates; a structurally identical pair of snapshots with marks
/// still yields a non-empty changeset.
pub fn reconcile<S, I>(old: &Snapshot<S, I>, new: &Snapshot<S, I>) -> StagedChangeset
where
    S: Hash + Eq + Clone,
    I: Hash + Eq + Clone,
{
    let old_sections: Vec<(&S, &[I])> = old.sections().collect();
    let new_sections: Vec<(&S, &[I])> = new.sections().collect();
    let old_keys: Vec<&S> = old_sections.iter().map(|(key, _)| *key).collect();
    let new_keys: Vec<&S> = new_sections.iter().map(|(key, _)| *key).collect();

    let mut changeset = StagedChangeset::default();
    let section_diff = diff::diff(&old_keys, &new_keys);
    changeset.section_deleted = section_diff.deleted;
    changeset.section_inserted = section_diff.inserted;
    changeset.section_moved = section_diff.moved;

    let old_section_index: HashMap<&S, usize> = old_keys
        .iter()
        .enumerate()
        .map(|(index, key)| (*key, index))
        .collect();
    let new_section_index: HashMap<&S, usize> = new_keys
        .iter()
        .enumerate()
        .map(|(index, key)| (*key, index))
        .collect();

    // Global locators for cross-section reconciliation.
    let mut old_loc: HashMap<&I, ItemPosition> = HashMap::default();
    for (section, (_, items)) in old_sections.iter().enumerate() {
        for (index, item) in items.iter().enumerate() {
            old_loc.insert(item, ItemPosition::new(section, index));
        }
    }
    let mut new_loc: HashMap<&I, ItemPosition> = HashMap::default();
    for (section, (_, items)) in new_sections.iter().enumerate() {
        for (index, item) in items.iter().enumerate() {
            new_loc.insert(item, ItemPosition::new(section, index));
        }
    }

    // Ranks walk the old items with sections visited in new-snapshot
    // order, so a pure section reorder leaves every rank sequence
    // increasing and produces zero item moves on top of the section
    // move.
    let mut old_rank: HashMap<&I, usize> = HashMap::default();
    let mut rank = 0usize;
    for key in &new_keys {
        if let Some(&section) = old_section_index.get(key) {
            for item in old_sections[section].1 {
                old_rank.insert(item, rank);
                rank += 1;
            }
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for (new_section, (key, new_items)) in new_sections.iter().enumerate() {
        let Some(&old_section) = old_section_index.get(key) else {
            // Brand-new section; its items ride in with the section
            // insert.
            continue;
        };
        let old_items = old_sections[old_section].1;
        let section_diff = diff::diff(old_items, new_items);

        for &index in &section_diff.deleted {
            let item = &old_items[index];
            let from = ItemPosition::new(old_section, index);
            match new_loc.get(&item) {
                None => changeset.item_deleted.push(from),
                Some(to) => {
                    let destination_is_new =
                        !old_section_index.contains_key(new_sections[to.section].0);
                    if destination_is_new {
                        // The destination section's insert brings the
                        // item in; the old occurrence still has to go.
                        changeset.item_deleted.push(from);
                    }
                    // Otherwise the destination section's diff records
                    // the cross-section move.
                }
            }
        }

        for &index in &section_diff.inserted {
            let item = &new_items[index];
            let to = ItemPosition::new(new_section, index);
            match old_loc.get(&item) {
                None => changeset.item_inserted.push(to),
                Some(&from) => {
                    let origin_survives =
                        new_section_index.contains_key(old_sections[from.section].0);
                    if origin_survives {
                        candidates.push(Candidate {
                            rank: *old_rank.get(&item).expect("matched item has a rank"),
                            from,
                            to,
                            same_section: false,
                        });
                    } else {
                        // The origin vanished with its section; only
                        // the arrival needs an op.
                        changeset.item_inserted.push(to);
                    }
                }
            }
        }

        for &(old_index, new_index) in &section_diff.matched {
            let item = &old_items[old_index];
            candidates.push(Candidate {
                rank: *old_rank.get(&item).expect("matched item has a rank"),
                from: ItemPosition::new(old_section, old_index),
                to: ItemPosition::new(new_section, new_index),
                same_section: true,
            });
        }
    }

    // New-traversal order is what the subsequence pass is relative to.
    candidates.sort_by_key(|c| (c.to.section, c.to.item));

    let mut sequence: Vec<usize> = Vec::new();
    let mut sequence_source: Vec<usize> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.same_section {
            sequence.push(candidate.rank);
            sequence_source.push(index);
        }
    }
    let kept: HashSet<usize> = longest_increasing_subsequence(&sequence)
        .into_iter()
        .map(|i| sequence_source[i])
        .collect();

    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.same_section {
            // Cross-section moves can never stay put; the renderer has
            // to carry the item over regardless of relative order.
            changeset.item_moved.push((candidate.from, candidate.to));
        } else if !kept.contains(&index) && candidate.from != candidate.to {
            changeset.item_moved.push((candidate.from, candidate.to));
        }
    }

    for item in new.reloaded_item_marks() {
        if let Some(&position) = new_loc.get(&item) {
            changeset.item_reloaded.push(position);
        }
    }
    for item in new.reconfigured_item_marks() {
        if let Some(&position) = new_loc.get(&item) {
            changeset.item_reconfigured.push(position);
        }
    }
    for key in new.reloaded_section_marks() {
        if let Some(&index) = new_section_index.get(&key) {
            changeset.section_reloaded.push(index);
        }
    }
    // Mark sets iterate in hash order; keep the output deterministic.
    changeset.item_reloaded.sort_by_key(|p| (p.section, p.item));
    changeset
        .item_reconfigured
        .sort_by_key(|p| (p.section, p.item));
    changeset.section_reloaded.sort_unstable();

    changeset
}

/// Flat single-section reconciliation.
///
/// Diffs two item sequences and stages the result into `section`,
/// applying the same minimal-move filtering as [`reconcile`].
pub fn reconcile_items<I: Hash + Eq>(old: &[I], new: &[I], section: usize) -> StagedChangeset {
    let result = diff::diff(old, new);
    let mut changeset = StagedChangeset::default();
    changeset.item_deleted = result
        .deleted
        .iter()
        .map(|&index| ItemPosition::new(section, index))
        .collect();
    changeset.item_inserted = result
        .inserted
        .iter()
        .map(|&index| ItemPosition::new(section, index))
        .collect();

    let sequence: Vec<usize> = result.matched.iter().map(|&(old_index, _)| old_index).collect();
    let kept: HashSet<usize> = longest_increasing_subsequence(&sequence)
        .into_iter()
        .collect();
    for (index, &(old_index, new_index)) in result.matched.iter().enumerate() {
        if old_index != new_index && !kept.contains(&index) {
            changeset.item_moved.push((
                ItemPosition::new(section, old_index),
                ItemPosition::new(section, new_index),
            ));
        }
    }
    changeset
}

/// Longest strictly increasing subsequence by patience sorting,
/// O(n log n). Returns the positions of the chosen elements in `values`,
/// in ascending order.
fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    if values.is_empty() {
        return Vec::new();
    }
    // tails[k] is the position of the smallest tail among increasing
    // runs of length k + 1; parent links reconstruct the chain.
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; values.len()];
    for (position, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&tail| values[tail] < value);
        parent[position] = slot.checked_sub(1).map(|previous| tails[previous]);
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }
    let mut chain = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(position) = current {
        chain.push(position);
        current = parent[position];
    }
    chain.reverse();
    chain
}
