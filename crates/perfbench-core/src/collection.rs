use std::fmt;

use serde::{Deserialize, Serialize};

/// Concrete collection targeted by one fan-out slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionHandle {
    database: String,
    name: String,
}

impl CollectionHandle {
    /// Creates a handle for `database.name`.
    #[must_use]
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }

    /// Short collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Fully qualified `database.collection` namespace.
    #[must_use]
    pub fn full_namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}
