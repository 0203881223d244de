use crate::editing::document::BlockId;
use crate::editing::selection::Selection;

/// Result of applying a command
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Blocks created, modified or removed, in the order they were touched.
    pub changed: Vec<BlockId>,
    pub new_selection: Selection,
    pub version: u64,
    /// An editing policy refused the command; nothing changed.
    pub suppressed: bool,
}

impl Patch {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}
