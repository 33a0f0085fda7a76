//! Ordered, sectioned, keyed snapshot of a collection.
//!
//! A [`Snapshot`] is a plain value: callers mutate it through the
//! section and item operations, hand it to
//! [`reconcile`](crate::reconcile::reconcile) together with the
//! previous snapshot, and either discard it or keep it as the new
//! current state. There are no observers and no I/O.
//!
//! Item keys must be unique across the whole snapshot, not just within
//! a section. That is a caller contract; it is checked opportunistically
//! (see [`Snapshot::append_items`]) rather than validated on every call.

use std::cell::RefCell;
use std::hash::Hash;

use crate::collections::map::{HashMap, HashSet};

#[derive(Clone)]
struct Section<S, I> {
    key: S,
    items: Vec<I>,
}

/// Cache state of the item → section reverse index.
///
/// The index is built from scratch the first time an operation needs an
/// O(1) reverse lookup, patched by cheap single-item mutations, and
/// discarded outright by bulk structural mutations such as
/// [`Snapshot::delete_items`]. Patching a hash map for an
/// arbitrary-size delete is not cheaper than a later O(n) rebuild
/// amortized over a build-then-diff cycle, so invalidation wins there.
/// A pure "build N items, then diff" workflow never pays for the index
/// at all.
#[derive(Clone)]
enum ReverseIndex<I, S> {
    Absent,
    /// Ownership of the map is temporarily out of the cell while a
    /// lookup closure runs against it.
    Building,
    Present(HashMap<I, S>),
}

/// Cached positional view of the snapshot: section key to position,
/// item key to (section, item) coordinates, and per-section prefix
/// counts for flat indexing.
///
/// Unlike the reverse index, positions shift under any structural
/// mutation, so there is no cheap patch: every structural mutation
/// drops the cache and the next positional query rebuilds it in O(n).
/// Query bursts between mutations amortize to O(1) per call.
#[derive(Clone)]
struct Layout<S, I> {
    section_index: HashMap<S, usize>,
    item_index: HashMap<I, (usize, usize)>,
    /// `prefix[s]` is the number of items in sections before `s`.
    prefix: Vec<usize>,
    num_items: usize,
}

/// An ordered list of sections, each owning an ordered list of item
/// keys. Section order and item order are the render order.
pub struct Snapshot<S, I> {
    sections: Vec<Section<S, I>>,
    reverse: RefCell<ReverseIndex<I, S>>,
    layout: RefCell<Option<Layout<S, I>>>,
    reloaded_items: HashSet<I>,
    reconfigured_items: HashSet<I>,
    reloaded_sections: HashSet<S>,
}

impl<S: Clone, I: Clone> Clone for Snapshot<S, I> {
    fn clone(&self) -> Self {
        Self {
            sections: self.sections.clone(),
            reverse: self.reverse.clone(),
            layout: self.layout.clone(),
            reloaded_items: self.reloaded_items.clone(),
            reconfigured_items: self.reconfigured_items.clone(),
            reloaded_sections: self.reloaded_sections.clone(),
        }
    }
}

impl<S, I> Default for Snapshot<S, I> {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            reverse: RefCell::new(ReverseIndex::Absent),
            layout: RefCell::new(None),
            reloaded_items: HashSet::default(),
            reconfigured_items: HashSet::default(),
            reloaded_sections: HashSet::default(),
        }
    }
}

impl<S, I> Snapshot<S, I>
where
    S: Hash + Eq + Clone,
    I: Hash + Eq + Clone,
{
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    // --- queries ---

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn num_items(&self) -> usize {
        self.with_layout(|layout| layout.num_items)
    }

    pub fn num_items_in_section(&self, section: &S) -> Option<usize> {
        self.index_of_section(section)
            .map(|pos| self.sections[pos].items.len())
    }

    /// Section keys in render order.
    pub fn section_identifiers(&self) -> impl Iterator<Item = &S> {
        self.sections.iter().map(|s| &s.key)
    }

    /// All item keys in render order, flattened across sections.
    pub fn item_identifiers(&self) -> impl Iterator<Item = &I> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    /// Item keys of one section, or `None` when the section is absent.
    pub fn item_identifiers_in_section(&self, section: &S) -> Option<&[I]> {
        self.index_of_section(section)
            .map(|pos| self.sections[pos].items.as_slice())
    }

    /// Sections in render order, as (key, items) pairs.
    pub fn sections(&self) -> impl Iterator<Item = (&S, &[I])> {
        self.sections.iter().map(|s| (&s.key, s.items.as_slice()))
    }

    pub fn index_of_section(&self, section: &S) -> Option<usize> {
        self.with_layout(|layout| layout.section_index.get(section).copied())
    }

    /// Flat position of an item across the whole snapshot.
    pub fn index_of_item(&self, item: &I) -> Option<usize> {
        self.with_layout(|layout| {
            layout
                .item_index
                .get(item)
                .map(|&(section, index)| layout.prefix[section] + index)
        })
    }

    /// Key of the section containing `item`.
    ///
    /// Materializes the reverse index on first use.
    pub fn section_of_item(&self, item: &I) -> Option<S> {
        self.with_reverse_index(|map| map.get(item).cloned())
    }

    pub fn contains_item(&self, item: &I) -> bool {
        self.with_reverse_index(|map| map.contains_key(item))
    }

    // --- section mutations ---

    pub fn append_sections(&mut self, keys: Vec<S>) {
        self.invalidate_layout();
        for key in keys {
            debug_assert!(
                self.position_of_section(&key).is_none(),
                "section identity already present in the snapshot"
            );
            self.sections.push(Section {
                key,
                items: Vec::new(),
            });
        }
    }

    pub fn insert_sections_before(&mut self, keys: Vec<S>, anchor: &S) {
        self.insert_sections(keys, anchor, 0);
    }

    pub fn insert_sections_after(&mut self, keys: Vec<S>, anchor: &S) {
        self.insert_sections(keys, anchor, 1);
    }

    fn insert_sections(&mut self, keys: Vec<S>, anchor: &S, offset: usize) {
        let Some(pos) = self.position_of_section(anchor) else {
            log::warn!("section insert anchor is not present in the snapshot; ignoring insert");
            return;
        };
        self.invalidate_layout();
        for (n, key) in keys.into_iter().enumerate() {
            debug_assert!(
                self.position_of_section(&key).is_none(),
                "section identity already present in the snapshot"
            );
            self.sections.insert(
                pos + offset + n,
                Section {
                    key,
                    items: Vec::new(),
                },
            );
        }
    }

    /// Removes the named sections and every item they own.
    pub fn delete_sections(&mut self, keys: &[S]) {
        let doomed: HashSet<&S> = keys.iter().collect();
        self.sections.retain(|s| !doomed.contains(&s.key));
        self.reloaded_sections.retain(|key| !doomed.contains(key));
        // Items vanished wholesale; rebuilding later beats patching now.
        self.invalidate_reverse_index();
        self.invalidate_layout();
    }

    pub fn move_section_before(&mut self, section: &S, anchor: &S) {
        self.move_section(section, anchor, 0);
    }

    pub fn move_section_after(&mut self, section: &S, anchor: &S) {
        self.move_section(section, anchor, 1);
    }

    fn move_section(&mut self, section: &S, anchor: &S, offset: usize) {
        if section == anchor {
            return;
        }
        if self.position_of_section(anchor).is_none() {
            log::warn!("section move anchor is not present in the snapshot; ignoring move");
            return;
        }
        let Some(from) = self.position_of_section(section) else {
            log::warn!("moved section is not present in the snapshot; ignoring move");
            return;
        };
        self.invalidate_layout();
        let moved = self.sections.remove(from);
        let to = self
            .position_of_section(anchor)
            .expect("anchor validated above");
        self.sections.insert(to + offset, moved);
    }

    /// Marks existing sections for a full reload.
    pub fn reload_sections(&mut self, keys: Vec<S>) {
        for key in keys {
            if self.position_of_section(&key).is_some() {
                self.reloaded_sections.insert(key);
            } else {
                log::warn!("reloaded section is not present in the snapshot; ignoring mark");
            }
        }
    }

    // --- item mutations ---

    /// Appends items to the end of an existing section.
    ///
    /// # Panics
    ///
    /// Panics when the section does not exist; there is no
    /// sections-auto-create policy, so that is a caller bug.
    ///
    /// When the reverse index happens to be materialized, debug builds
    /// additionally assert that no appended key already lives in any
    /// section. Callers must not rely on this as a complete validator
    /// since the index may not be built yet.
    pub fn append_items(&mut self, items: Vec<I>, to_section: &S) {
        let Some(pos) = self.position_of_section(to_section) else {
            panic!("section does not exist in the snapshot; insert it before appending items");
        };
        self.invalidate_layout();
        for item in items {
            if let ReverseIndex::Present(map) = self.reverse.get_mut() {
                debug_assert!(
                    !map.contains_key(&item),
                    "item identity already present in the snapshot"
                );
                map.insert(item.clone(), to_section.clone());
            }
            self.sections[pos].items.push(item);
        }
    }

    pub fn insert_items_before(&mut self, items: Vec<I>, anchor: &I) {
        self.insert_items(items, anchor, 0);
    }

    pub fn insert_items_after(&mut self, items: Vec<I>, anchor: &I) {
        self.insert_items(items, anchor, 1);
    }

    fn insert_items(&mut self, items: Vec<I>, anchor: &I, offset: usize) {
        let Some((section, index)) = self.locate_item(anchor) else {
            log::warn!("item insert anchor is not present in the snapshot; ignoring insert");
            return;
        };
        self.invalidate_layout();
        let key = self.sections[section].key.clone();
        for (n, item) in items.into_iter().enumerate() {
            if let ReverseIndex::Present(map) = self.reverse.get_mut() {
                debug_assert!(
                    !map.contains_key(&item),
                    "item identity already present in the snapshot"
                );
                map.insert(item.clone(), key.clone());
            }
            self.sections[section].items.insert(index + offset + n, item);
        }
    }

    /// Removes items wherever they live. Unknown keys are ignored.
    pub fn delete_items(&mut self, items: &[I]) {
        let doomed: HashSet<&I> = items.iter().collect();
        for section in &mut self.sections {
            section.items.retain(|item| !doomed.contains(item));
        }
        self.reloaded_items.retain(|item| !doomed.contains(item));
        self.reconfigured_items.retain(|item| !doomed.contains(item));
        self.invalidate_reverse_index();
        self.invalidate_layout();
    }

    pub fn move_item_before(&mut self, item: &I, anchor: &I) {
        self.move_item(item, anchor, 0);
    }

    pub fn move_item_after(&mut self, item: &I, anchor: &I) {
        self.move_item(item, anchor, 1);
    }

    fn move_item(&mut self, item: &I, anchor: &I, offset: usize) {
        if item == anchor {
            return;
        }
        // Validate the destination before touching the source. Removing
        // the item first and checking the anchor afterwards silently
        // loses the item on a bad anchor.
        if self.locate_item(anchor).is_none() {
            log::warn!("item move anchor is not present in the snapshot; ignoring move");
            return;
        }
        let Some((src_section, src_index)) = self.locate_item(item) else {
            log::warn!("moved item is not present in the snapshot; ignoring move");
            return;
        };
        self.invalidate_layout();
        let moved = self.sections[src_section].items.remove(src_index);
        let (dst_section, dst_index) = self
            .locate_item(anchor)
            .expect("anchor validated above and distinct from the moved item");
        let key = self.sections[dst_section].key.clone();
        self.sections[dst_section]
            .items
            .insert(dst_index + offset, moved);
        if let ReverseIndex::Present(map) = self.reverse.get_mut() {
            map.insert(item.clone(), key);
        }
    }

    /// Marks existing items for a full rebind.
    pub fn reload_items(&mut self, items: Vec<I>) {
        for item in items {
            if self.contains_item(&item) {
                self.reloaded_items.insert(item);
            } else {
                log::warn!("reloaded item is not present in the snapshot; ignoring mark");
            }
        }
    }

    /// Marks existing items for an in-place content refresh.
    pub fn reconfigure_items(&mut self, items: Vec<I>) {
        for item in items {
            if self.contains_item(&item) {
                self.reconfigured_items.insert(item);
            } else {
                log::warn!("reconfigured item is not present in the snapshot; ignoring mark");
            }
        }
    }

    // --- internals ---

    pub(crate) fn reloaded_item_marks(&self) -> &HashSet<I> {
        &self.reloaded_items
    }

    pub(crate) fn reconfigured_item_marks(&self) -> &HashSet<I> {
        &self.reconfigured_items
    }

    pub(crate) fn reloaded_section_marks(&self) -> &HashSet<S> {
        &self.reloaded_sections
    }

    fn position_of_section(&self, key: &S) -> Option<usize> {
        self.sections.iter().position(|s| &s.key == key)
    }

    fn locate_item(&self, item: &I) -> Option<(usize, usize)> {
        let key = self.with_reverse_index(|map| map.get(item).cloned())?;
        let section = self.position_of_section(&key)?;
        let index = self.sections[section]
            .items
            .iter()
            .position(|candidate| candidate == item)?;
        Some((section, index))
    }

    fn invalidate_reverse_index(&mut self) {
        *self.reverse.get_mut() = ReverseIndex::Absent;
    }

    fn invalidate_layout(&mut self) {
        *self.layout.get_mut() = None;
    }

    /// Runs `f` against the positional layout cache, rebuilding it
    /// first when a structural mutation dropped it.
    fn with_layout<R>(&self, f: impl FnOnce(&Layout<S, I>) -> R) -> R {
        let layout = self.layout.take().unwrap_or_else(|| self.build_layout());
        let out = f(&layout);
        self.layout.replace(Some(layout));
        out
    }

    fn build_layout(&self) -> Layout<S, I> {
        let mut section_index = HashMap::default();
        let mut item_index = HashMap::default();
        let mut prefix = Vec::with_capacity(self.sections.len());
        let mut total = 0;
        for (section, entry) in self.sections.iter().enumerate() {
            section_index.insert(entry.key.clone(), section);
            prefix.push(total);
            for (index, item) in entry.items.iter().enumerate() {
                item_index.insert(item.clone(), (section, index));
            }
            total += entry.items.len();
        }
        Layout {
            section_index,
            item_index,
            prefix,
            num_items: total,
        }
    }

    /// Runs `f` against the reverse index, materializing it first when
    /// it is absent. The map is moved out of the cell for the duration
    /// so the closure can borrow it without re-entrancy hazards.
    fn with_reverse_index<R>(&self, f: impl FnOnce(&HashMap<I, S>) -> R) -> R {
        let taken = self.reverse.replace(ReverseIndex::Building);
        let map = match taken {
            ReverseIndex::Present(map) => map,
            ReverseIndex::Absent | ReverseIndex::Building => self.build_reverse_index(),
        };
        let out = f(&map);
        self.reverse.replace(ReverseIndex::Present(map));
        out
    }

    fn build_reverse_index(&self) -> HashMap<I, S> {
        let mut map = HashMap::default();
        map.reserve(self.sections.iter().map(|s| s.items.len()).sum());
        for section in &self.sections {
            for item in &section.items {
                let previous = map.insert(item.clone(), section.key.clone());
                debug_assert!(
                    previous.is_none(),
                    "item identity present in more than one section"
                );
            }
        }
        map
    }
}
