//! Observation hooks for tree walks

/// A node reached by a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit<'a> {
    /// A leaf, after any value indirection has been resolved.
    Leaf { key: &'a [u8], version: u64 },
    /// An inner node, after both of its subtrees.
    Inner { key: &'a [u8], height: u8, size: u64 },
}

/// Receives every node visited by [`ImmutableTree::save_to`]. Observers can
/// only watch: the walker alone decides how far to go.
///
/// [`ImmutableTree::save_to`]: crate::ImmutableTree::save_to
pub trait NodeObserver {
    fn visited(&mut self, visit: Visit<'_>);
}

impl<F: FnMut(Visit<'_>)> NodeObserver for F {
    fn visited(&mut self, visit: Visit<'_>) {
        self(visit)
    }
}
