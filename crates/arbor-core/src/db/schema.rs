//! SQLite schema for the local category store.
//!
//! - `categories` and `contents` hold one row per record, keyed by the
//!   persistence-assigned id and tagged with the owner scope
//! - `parent_id` and `category_id` are deliberately not foreign keys: the
//!   tree builder tolerates orphans, and soft-deleted rows stay in place
//! - `store_meta` records the schema version alongside `PRAGMA user_version`

/// Migration v1: record tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    domain TEXT NOT NULL,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    kind TEXT NOT NULL,
    parent_id INTEGER,
    depth INTEGER NOT NULL DEFAULT 0 CHECK (depth >= 0),
    display_order INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE TABLE IF NOT EXISTS contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    domain TEXT NOT NULL,
    category_id INTEGER NOT NULL,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    body TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT 'null',
    display_order INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);
";

/// Migration v2: scope-leading indexes for sibling-group reads.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_categories_scope_parent
    ON categories(owner_id, domain, parent_id, display_order);

CREATE INDEX IF NOT EXISTS idx_contents_scope_category
    ON contents(owner_id, domain, category_id, display_order);
";

/// Indexes every migrated database must carry.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_categories_scope_parent",
    "idx_contents_scope_category",
];
