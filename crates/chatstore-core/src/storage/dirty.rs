/// Unflushed-changes flag.
///
/// Lives inside the store state, so it is guarded by the document lock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirtyTracker {
    dirty: bool,
}

impl DirtyTracker {
    pub fn mark(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a flush should happen now
    pub fn needs_flush(&self, force: bool) -> bool {
        force || self.dirty
    }

    pub fn clear(&mut self) {
        self.dirty = false;
    }
}
