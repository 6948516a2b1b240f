//! Move planning for categories and content items.
//!
//! Planners are pure: they read a [`crate::tree::Forest`] or
//! [`crate::tree::ContentLists`] and return a [`PatchSet`] describing the
//! new placements. The store applies patch sets; nothing here mutates.
//!
//! ## Submodules
//!
//! - [`slot`]: gap/midpoint arithmetic and group renumbering.
//! - [`category`]: `before`/`after`/`inside` moves with depth cascade.
//! - [`content`]: single-level content moves and re-categorizing.
//! - [`patch`]: patch entry types shared by both.

pub mod category;
pub mod content;
pub mod patch;
pub mod slot;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use category::plan_move;
pub use content::{plan_content_move, plan_recategorize};
pub use patch::{CategoryPatch, ContentPatch, PatchSet};

use crate::model::ParseEnumError;

/// Where a dragged item lands relative to the drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Before,
    After,
    Inside,
}

impl Position {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Inside => "inside",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            "inside" | "into" => Ok(Self::Inside),
            _ => Err(ParseEnumError {
                expected: "position",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Position;
    use std::str::FromStr;

    #[test]
    fn position_parses_drop_zone_names() {
        assert_eq!(Position::from_str("Before").unwrap(), Position::Before);
        assert_eq!(Position::from_str("into").unwrap(), Position::Inside);
        assert!(Position::from_str("above").is_err());
        assert_eq!(Position::After.to_string(), "after");
    }
}
