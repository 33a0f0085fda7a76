//! Staged changeset produced by reconciliation.

/// Coordinates of an item inside a sectioned snapshot.
///
/// `section` is the position of the containing section, `item` the
/// position inside it. Whether the coordinates refer to the old or the
/// new snapshot depends on the changeset field carrying them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemPosition {
    pub section: usize,
    pub item: usize,
}

impl ItemPosition {
    pub fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

/// Structural edits that transform one sectioned snapshot into another.
///
/// Section fields use flat section indices; item fields use
/// [`ItemPosition`] coordinates. Deletions are expressed in the old
/// snapshot's index space, insertions and reloads in the new one, and
/// moves span both (old origin, new destination).
///
/// The intended apply order is: structural deletes (highest old index
/// first), then inserts (ascending new index), then moves, then
/// reloads and reconfigures at new coordinates. The changeset is
/// internally consistent with that order; applying it is the rendering
/// collaborator's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedChangeset {
    /// Old indices of removed sections.
    pub section_deleted: Vec<usize>,
    /// New indices of added sections.
    pub section_inserted: Vec<usize>,
    /// Matched sections whose index changed, as (old, new) pairs.
    pub section_moved: Vec<(usize, usize)>,
    /// New indices of sections marked for a full reload.
    pub section_reloaded: Vec<usize>,
    /// Old coordinates of removed items.
    pub item_deleted: Vec<ItemPosition>,
    /// New coordinates of added items.
    pub item_inserted: Vec<ItemPosition>,
    /// Relocated items, as (old, new) coordinate pairs.
    pub item_moved: Vec<(ItemPosition, ItemPosition)>,
    /// New coordinates of items marked for a full rebind.
    pub item_reloaded: Vec<ItemPosition>,
    /// New coordinates of items marked for an in-place content refresh.
    pub item_reconfigured: Vec<ItemPosition>,
}

impl StagedChangeset {
    /// Returns `true` when there is nothing to apply: no structural
    /// edits and no reload or reconfigure markers.
    pub fn is_empty(&self) -> bool {
        self.section_deleted.is_empty()
            && self.section_inserted.is_empty()
            && self.section_moved.is_empty()
            && self.section_reloaded.is_empty()
            && self.item_deleted.is_empty()
            && self.item_inserted.is_empty()
            && self.item_moved.is_empty()
            && self.item_reloaded.is_empty()
            && self.item_reconfigured.is_empty()
    }
}
