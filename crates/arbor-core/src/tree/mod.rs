//! Tree builder: flat category records in, ordered forest out.
//!
//! - [`build_forest`] groups, sorts and depth-stamps a snapshot.
//! - [`Forest`] answers the structural queries the engine and the UI need:
//!   siblings, ancestors, descendants, pre-order rows.
//! - [`ContentLists`] is the single-level counterpart for content leaves.

pub mod builder;
pub mod contents;
pub mod forest;

pub use builder::build_forest;
pub use contents::ContentLists;
pub use forest::Forest;
