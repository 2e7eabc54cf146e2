//! Positional parameter storage for built statements.

use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A clone-friendly bound value.
#[derive(Clone)]
pub struct Param(Arc<dyn ToSql + Send + Sync>);

impl Param {
    /// Wrap any `ToSql` value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Borrow as the trait object tokio-postgres expects.
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&self.0).finish()
    }
}

/// Ordered parameters of one statement.
///
/// Placeholder numbers are derived from the list: the value pushed n-th
/// (counting any `offset` the list was started with) binds to `$n`.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    offset: usize,
    params: Vec<Param>,
}

impl ParamList {
    /// Create a new empty parameter list numbering from `$1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list whose first placeholder is `$offset + 1`.
    ///
    /// Used when an earlier fragment of the same statement already consumed
    /// `offset` parameters.
    pub fn starting_after(offset: usize) -> Self {
        Self {
            offset,
            params: Vec::new(),
        }
    }

    /// Add a parameter and return its 1-based placeholder index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.push_param(Param::new(value))
    }

    /// Add a pre-wrapped Param and return its 1-based placeholder index.
    pub fn push_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.next_index() - 1
    }

    /// The placeholder index the next pushed value will receive.
    pub fn next_index(&self) -> usize {
        self.offset + self.params.len() + 1
    }

    /// Number of values held by this list (not counting the offset).
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append another list's values.
    ///
    /// `other` must have been started at this list's current end, so the
    /// placeholders it rendered stay valid.
    pub fn append(&mut self, other: ParamList) {
        debug_assert_eq!(other.offset + 1, self.next_index());
        self.params.extend(other.params);
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(Param::as_sql).collect()
    }
}
