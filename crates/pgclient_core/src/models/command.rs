//! Statement result tag.

/// What the server reported after running a statement: the number of rows
/// it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandTag(u64);

impl CommandTag {
    /// Wrap a row count.
    pub fn new(rows_affected: u64) -> Self {
        Self(rows_affected)
    }

    /// Rows inserted, updated, deleted or returned.
    pub fn rows_affected(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CommandTag {
    fn from(rows_affected: u64) -> Self {
        Self(rows_affected)
    }
}

impl std::fmt::Display for CommandTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
