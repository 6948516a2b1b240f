use std::fmt;

use crate::model::EntityRef;

/// Machine-readable error codes for UI-facing error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidMove,
    NotFound,
    ValidationFailed,
    PersistenceRejected,
    PersistenceUnavailable,
    StorageFailed,
    Conflict,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidMove => "E2001",
            Self::NotFound => "E2002",
            Self::ValidationFailed => "E2003",
            Self::PersistenceRejected => "E3001",
            Self::PersistenceUnavailable => "E3002",
            Self::StorageFailed => "E3003",
            Self::Conflict => "E4001",
        }
    }

    /// Short human-facing summary for logs and UI toasts.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidMove => "Move is not structurally allowed",
            Self::NotFound => "Category or content not found",
            Self::ValidationFailed => "Invalid field value",
            Self::PersistenceRejected => "Change rejected by the server",
            Self::PersistenceUnavailable => "Server unavailable",
            Self::StorageFailed => "Local storage failure",
            Self::Conflict => "Change superseded by a newer load",
        }
    }

    /// Optional remediation hint that can be surfaced next to the message.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .arbor/config.toml and retry."),
            Self::InvalidMove => Some("A category cannot be dropped onto itself or its own descendants."),
            Self::NotFound => Some("Reload the list; the item may have been removed elsewhere."),
            Self::ValidationFailed => Some("Names and titles must not be empty."),
            Self::PersistenceRejected | Self::PersistenceUnavailable => {
                Some("The change was rolled back. Retry once the server responds.")
            }
            Self::StorageFailed => Some("Check disk space and write permissions."),
            Self::Conflict => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Why a planned move was rejected before touching any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// The request is structurally illegal (self-target, cycle, `inside` on
    /// a content item, cross-category content move).
    #[error("invalid move of {moving} relative to {target}: {reason}")]
    InvalidMove {
        moving: EntityRef,
        target: EntityRef,
        reason: &'static str,
    },

    /// An id is not present in the current forest or content list.
    #[error("{0} not found")]
    NotFound(EntityRef),
}

impl OrderError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidMove { .. } => ErrorCode::InvalidMove,
            Self::NotFound(_) => ErrorCode::NotFound,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

/// Failure reported by a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The backing store refused the mutation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backing store could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The referenced record does not exist on the backing store.
    #[error("{0} not found on the backing store")]
    NotFound(EntityRef),

    /// The local SQLite store failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl PersistenceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected(_) | Self::NotFound(_) => ErrorCode::PersistenceRejected,
            Self::Unavailable(_) => ErrorCode::PersistenceUnavailable,
            Self::Sqlite(_) => ErrorCode::StorageFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`crate::store::CategoryStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Rejected locally by the engine; nothing was mutated.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A name or title failed validation; nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Fetching a snapshot failed; the current state is unchanged.
    #[error("load failed: {0}")]
    Load(#[source] PersistenceError),

    /// The persistence call failed and the optimistic change was rolled back.
    #[error("persistence failure (rolled back): {0}")]
    PersistenceFailure(#[source] PersistenceError),

    /// A newer `load()` replaced the state this change was applied to.
    /// `rejected` carries the write failure, if the backend also refused it.
    #[error("change to {entity} superseded by load generation {current}")]
    Conflict {
        entity: EntityRef,
        current: u64,
        #[source]
        rejected: Option<PersistenceError>,
    },
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Order(e) => e.code(),
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Load(e) | Self::PersistenceFailure(e) => e.code(),
            Self::Conflict { .. } => ErrorCode::Conflict,
        }
    }

    /// `true` when the error was detected before any state change.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Order(_) | Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, OrderError, PersistenceError, StoreError};
    use crate::model::EntityRef;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidMove,
            ErrorCode::NotFound,
            ErrorCode::ValidationFailed,
            ErrorCode::PersistenceRejected,
            ErrorCode::PersistenceUnavailable,
            ErrorCode::StorageFailed,
            ErrorCode::Conflict,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::InvalidMove.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn order_error_display_names_both_ends() {
        let e = OrderError::InvalidMove {
            moving: EntityRef::Category(1),
            target: EntityRef::Category(4),
            reason: "target is a descendant of the moving category",
        };
        let s = e.to_string();
        assert!(s.contains("category 1"));
        assert!(s.contains("category 4"));
        assert!(s.contains("descendant"));
    }

    #[test]
    fn store_error_codes_follow_source() {
        let local = StoreError::from(OrderError::NotFound(EntityRef::Content(7)));
        assert_eq!(local.code(), ErrorCode::NotFound);
        assert!(local.is_local());

        let remote =
            StoreError::PersistenceFailure(PersistenceError::Unavailable("timeout".into()));
        assert_eq!(remote.code(), ErrorCode::PersistenceUnavailable);
        assert!(!remote.is_local());
        assert!(remote.to_string().contains("rolled back"));
    }
}
