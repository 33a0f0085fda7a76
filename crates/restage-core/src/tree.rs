//! Tree-shaped snapshot of a single section.
//!
//! A [`TreeSnapshot`] keeps every item, visible or not, in one
//! canonical depth-first order, together with parent/child maps and a
//! per-node expansion flag. Collapsing a node hides its subtree from
//! [`TreeSnapshot::visible_items`] without touching the underlying
//! order, so expanding it again restores exactly the previous layout.

use std::hash::Hash;

use smallvec::SmallVec;

use crate::collections::map::{HashMap, HashSet};

type Children<I> = SmallVec<[I; 4]>;

/// Hierarchy of keyed items with expand/collapse visibility.
///
/// The depth-first `order` list is canonical: every structural
/// operation maintains it directly, and `parents`/`children` are
/// mutual inverses restricted to immediate relationships.
pub struct TreeSnapshot<I> {
    order: Vec<I>,
    parents: HashMap<I, I>,
    children: HashMap<I, Children<I>>,
    expanded: HashSet<I>,
}

impl<I: Clone> Clone for TreeSnapshot<I> {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            parents: self.parents.clone(),
            children: self.children.clone(),
            expanded: self.expanded.clone(),
        }
    }
}

impl<I> Default for TreeSnapshot<I> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            parents: HashMap::default(),
            children: HashMap::default(),
            expanded: HashSet::default(),
        }
    }
}

impl<I> TreeSnapshot<I>
where
    I: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    // --- queries ---

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, item: &I) -> bool {
        self.position_of(item).is_some()
    }

    /// Every item in depth-first order, including hidden ones.
    pub fn items(&self) -> &[I] {
        &self.order
    }

    pub fn parent_of(&self, item: &I) -> Option<&I> {
        self.parents.get(item)
    }

    /// Distance from `item` to its root: 0 for roots.
    pub fn level_of(&self, item: &I) -> Option<usize> {
        if !self.contains(item) {
            return None;
        }
        let mut level = 0;
        let mut current = item;
        while let Some(parent) = self.parents.get(current) {
            level += 1;
            current = parent;
        }
        Some(level)
    }

    pub fn is_expanded(&self, item: &I) -> bool {
        self.expanded.contains(item)
    }

    /// An item is visible when every ancestor is expanded. The item's
    /// own expansion state does not matter.
    pub fn is_visible(&self, item: &I) -> bool {
        if !self.contains(item) {
            return false;
        }
        let mut current = item;
        while let Some(parent) = self.parents.get(current) {
            if !self.expanded.contains(parent) {
                return false;
            }
            current = parent;
        }
        true
    }

    /// Items without a parent, in depth-first order.
    pub fn root_items(&self) -> Vec<I> {
        self.order
            .iter()
            .filter(|item| !self.parents.contains_key(*item))
            .cloned()
            .collect()
    }

    /// Items reachable through expanded ancestors, in depth-first
    /// order.
    ///
    /// Computed in one top-down pass: a parent always precedes its
    /// children in the canonical order, so each item's visibility
    /// follows from its parent's already-computed visibility without
    /// per-item ancestor walks.
    pub fn visible_items(&self) -> Vec<I> {
        let mut visibility: HashMap<&I, bool> = HashMap::default();
        visibility.reserve(self.order.len());
        let mut visible = Vec::new();
        for item in &self.order {
            let shown = match self.parents.get(item) {
                None => true,
                Some(parent) => {
                    visibility.get(parent).copied().unwrap_or(false)
                        && self.expanded.contains(parent)
                }
            };
            visibility.insert(item, shown);
            if shown {
                visible.push(item.clone());
            }
        }
        visible
    }

    // --- mutations ---

    /// Appends items under `parent`, or as roots when `parent` is
    /// `None`. Children land immediately after the parent's current
    /// last descendant, keeping the depth-first order intact without a
    /// re-linearization.
    ///
    /// # Panics
    ///
    /// Panics when `parent` names a key that is not in the snapshot.
    pub fn append(&mut self, items: Vec<I>, parent: Option<&I>) {
        let (mut at, parent_key) = match parent {
            Some(parent) => {
                let Some(pos) = self.position_of(parent) else {
                    panic!("parent does not exist in the tree snapshot; append it first");
                };
                (pos + self.subtree_len(parent), Some(parent.clone()))
            }
            None => (self.order.len(), None),
        };
        for item in items {
            debug_assert!(
                self.position_of(&item).is_none(),
                "item identity already present in the tree snapshot"
            );
            self.order.insert(at, item.clone());
            at += 1;
            if let Some(parent) = &parent_key {
                self.parents.insert(item.clone(), parent.clone());
                self.children.entry(parent.clone()).or_default().push(item);
            }
        }
    }

    /// Inserts items as siblings immediately before `sibling`.
    pub fn insert_before(&mut self, items: Vec<I>, sibling: &I) {
        let Some(pos) = self.position_of(sibling) else {
            log::warn!("insert sibling is not present in the tree snapshot; ignoring insert");
            return;
        };
        self.insert_siblings(items, sibling, pos, 0);
    }

    /// Inserts items as siblings after `sibling`'s whole subtree.
    pub fn insert_after(&mut self, items: Vec<I>, sibling: &I) {
        let Some(pos) = self.position_of(sibling) else {
            log::warn!("insert sibling is not present in the tree snapshot; ignoring insert");
            return;
        };
        let at = pos + self.subtree_len(sibling);
        self.insert_siblings(items, sibling, at, 1);
    }

    fn insert_siblings(&mut self, items: Vec<I>, sibling: &I, mut at: usize, child_offset: usize) {
        let parent = self.parents.get(sibling).cloned();
        let child_slot = parent.as_ref().map(|p| {
            let siblings = &self.children[p];
            let slot = siblings
                .iter()
                .position(|c| c == sibling)
                .expect("children map out of sync with parent map");
            slot + child_offset
        });
        for (n, item) in items.into_iter().enumerate() {
            debug_assert!(
                self.position_of(&item).is_none(),
                "item identity already present in the tree snapshot"
            );
            self.order.insert(at, item.clone());
            at += 1;
            if let Some(parent) = &parent {
                self.parents.insert(item.clone(), parent.clone());
                let siblings = self.children.get_mut(parent).expect("parent has children");
                siblings.insert(child_slot.expect("slot computed for parented insert") + n, item);
            }
        }
    }

    /// Removes each item and its whole induced subtree.
    pub fn delete(&mut self, items: &[I]) {
        for item in items {
            if !self.contains(item) {
                continue;
            }
            let mut doomed: HashSet<I> = HashSet::default();
            self.collect_subtree(item, &mut doomed);
            if let Some(parent) = self.parents.get(item).cloned() {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|c| c != item);
                }
            }
            self.order.retain(|candidate| !doomed.contains(candidate));
            for key in &doomed {
                self.parents.remove(key);
                self.children.remove(key);
                self.expanded.remove(key);
            }
        }
    }

    /// Marks items so their children count as visible.
    pub fn expand(&mut self, items: &[I]) {
        for item in items {
            if self.contains(item) {
                self.expanded.insert(item.clone());
            }
        }
    }

    /// Clears the expansion flag, hiding each item's subtree.
    pub fn collapse(&mut self, items: &[I]) {
        for item in items {
            self.expanded.remove(item);
        }
    }

    /// Copies `item`'s descendants, and `item` itself when
    /// `including_item` is set, into a new, independent snapshot.
    ///
    /// Returns `None` when `item` is absent. The copy's parent map only
    /// references keys that exist in the copy: when `item` is excluded
    /// its direct children become roots rather than keeping a dangling
    /// parent reference.
    pub fn subtree(&self, item: &I, including_item: bool) -> Option<TreeSnapshot<I>> {
        if !self.contains(item) {
            return None;
        }
        let mut keys: HashSet<I> = HashSet::default();
        self.collect_subtree(item, &mut keys);
        let mut out = TreeSnapshot::new();
        for key in &self.order {
            if !keys.contains(key) || (!including_item && key == item) {
                continue;
            }
            out.order.push(key.clone());
            if let Some(parent) = self.parents.get(key) {
                let parent_kept = keys.contains(parent) && (including_item || parent != item);
                if parent_kept {
                    out.parents.insert(key.clone(), parent.clone());
                    out.children
                        .entry(parent.clone())
                        .or_default()
                        .push(key.clone());
                }
            }
            if self.expanded.contains(key) {
                out.expanded.insert(key.clone());
            }
        }
        Some(out)
    }

    // --- internals ---

    fn position_of(&self, item: &I) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == item)
    }

    /// Number of nodes in `item`'s subtree, itself included.
    fn subtree_len(&self, item: &I) -> usize {
        let mut len = 1;
        if let Some(children) = self.children.get(item) {
            for child in children {
                len += self.subtree_len(child);
            }
        }
        len
    }

    fn collect_subtree(&self, item: &I, out: &mut HashSet<I>) {
        out.insert(item.clone());
        if let Some(children) = self.children.get(item) {
            for child in children {
                self.collect_subtree(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> TreeSnapshot<String> {
        // A (expanded)
        // ├── B
        // │   └── D
        // └── C
        // E
        let mut tree = TreeSnapshot::new();
        tree.append(chars(&["A"]), None);
        tree.append(chars(&["B", "C"]), Some(&"A".to_string()));
        tree.append(chars(&["D"]), Some(&"B".to_string()));
        tree.append(chars(&["E"]), None);
        tree.expand(&chars(&["A"]));
        tree
    }

    #[test]
    fn depth_first_order_is_canonical() {
        let tree = sample();
        assert_eq!(tree.items(), chars(&["A", "B", "D", "C", "E"]));
        assert_eq!(tree.root_items(), chars(&["A", "E"]));
        assert_eq!(tree.level_of(&"D".to_string()), Some(2));
        assert_eq!(tree.parent_of(&"C".to_string()), Some(&"A".to_string()));
    }

    #[test]
    fn children_append_after_existing_subtree() {
        let mut tree = sample();
        // B already owns D; a new child of A must land after C, the
        // current end of A's subtree.
        tree.append(chars(&["F"]), Some(&"A".to_string()));
        assert_eq!(tree.items(), chars(&["A", "B", "D", "C", "F", "E"]));
    }

    #[test]
    #[should_panic(expected = "parent does not exist")]
    fn appending_under_unknown_parent_is_fatal() {
        let mut tree: TreeSnapshot<String> = TreeSnapshot::new();
        tree.append(chars(&["X"]), Some(&"missing".to_string()));
    }

    #[test]
    fn visibility_follows_expansion() {
        let mut tree = sample();
        // B is collapsed, so D stays hidden even though A is expanded.
        assert_eq!(tree.visible_items(), chars(&["A", "B", "C", "E"]));
        tree.expand(&chars(&["B"]));
        assert_eq!(tree.visible_items(), chars(&["A", "B", "D", "C", "E"]));
        tree.collapse(&chars(&["A"]));
        // Collapsing an ancestor hides the whole subtree without
        // touching the canonical order.
        assert_eq!(tree.visible_items(), chars(&["A", "E"]));
        assert_eq!(tree.items(), chars(&["A", "B", "D", "C", "E"]));
    }

    #[test]
    fn visibility_of_single_items() {
        let mut tree = sample();
        assert!(tree.is_visible(&"B".to_string()));
        assert!(!tree.is_visible(&"D".to_string()));
        assert!(!tree.is_visible(&"missing".to_string()));
        tree.expand(&chars(&["B"]));
        assert!(tree.is_visible(&"D".to_string()));
    }

    #[test]
    fn append_roots_then_children_scenario() {
        let mut tree = TreeSnapshot::new();
        tree.append(chars(&["A"]), None);
        tree.expand(&chars(&["A"]));
        tree.append(chars(&["B", "C"]), Some(&"A".to_string()));
        assert_eq!(tree.visible_items(), chars(&["A", "B", "C"]));
        tree.collapse(&chars(&["A"]));
        assert_eq!(tree.visible_items(), chars(&["A"]));
        assert_eq!(tree.items(), chars(&["A", "B", "C"]));
    }

    #[test]
    fn insert_before_and_after_respect_subtrees() {
        let mut tree = sample();
        tree.insert_before(chars(&["X"]), &"C".to_string());
        // Inserting after B must skip past D, B's subtree.
        tree.insert_after(chars(&["Y"]), &"B".to_string());
        assert_eq!(tree.items(), chars(&["A", "B", "D", "Y", "X", "C", "E"]));
        assert_eq!(tree.parent_of(&"X".to_string()), Some(&"A".to_string()));
        assert_eq!(tree.parent_of(&"Y".to_string()), Some(&"A".to_string()));
        // Sibling order in the children map matches the canonical order.
        tree.expand(&chars(&["A"]));
        assert_eq!(tree.visible_items(), chars(&["A", "B", "Y", "X", "C", "E"]));
    }

    #[test]
    fn insert_with_unknown_sibling_is_a_no_op() {
        let mut tree = sample();
        tree.insert_after(chars(&["X"]), &"missing".to_string());
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn delete_removes_whole_subtrees() {
        let mut tree = sample();
        tree.delete(&chars(&["B"]));
        assert_eq!(tree.items(), chars(&["A", "C", "E"]));
        assert!(!tree.contains(&"D".to_string()));
        assert_eq!(tree.parent_of(&"D".to_string()), None);
        // A's children list no longer mentions B.
        tree.append(chars(&["F"]), Some(&"A".to_string()));
        assert_eq!(tree.items(), chars(&["A", "C", "F", "E"]));
    }

    #[test]
    fn subtree_extraction_including_item() {
        let tree = sample();
        let sub = tree.subtree(&"A".to_string(), true).unwrap();
        assert_eq!(sub.items(), chars(&["A", "B", "D", "C"]));
        assert_eq!(sub.parent_of(&"B".to_string()), Some(&"A".to_string()));
        assert!(sub.is_expanded(&"A".to_string()));
        assert!(!sub.contains(&"E".to_string()));
    }

    #[test]
    fn subtree_extraction_never_dangles() {
        let tree = sample();
        let sub = tree.subtree(&"A".to_string(), false).unwrap();
        assert_eq!(sub.items(), chars(&["B", "D", "C"]));
        // B and C lost their parent and must be roots in the copy, not
        // carry a reference to a key outside it.
        assert_eq!(sub.parent_of(&"B".to_string()), None);
        assert_eq!(sub.parent_of(&"C".to_string()), None);
        assert_eq!(sub.root_items(), chars(&["B", "C"]));
        for item in sub.items() {
            if let Some(parent) = sub.parent_of(item) {
                assert!(sub.contains(parent), "dangling parent reference");
            }
        }
        assert_eq!(sub.parent_of(&"D".to_string()), Some(&"B".to_string()));
    }

    #[test]
    fn extracted_subtree_is_independent() {
        let tree = sample();
        let mut sub = tree.subtree(&"B".to_string(), true).unwrap();
        sub.append(chars(&["Z"]), Some(&"B".to_string()));
        assert!(sub.contains(&"Z".to_string()));
        assert!(!tree.contains(&"Z".to_string()));
    }
}
