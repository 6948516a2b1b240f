use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::error::PersistenceError;
use crate::model::{Category, CategoryId, Content, ContentId, EntityRef, OwnerScope};
use crate::persist::{CategoryUpdate, ContentUpdate, NewCategory, NewContent, Persistence};

const CATEGORY_COLUMNS: &str =
    "id, owner_id, name, kind, parent_id, depth, display_order, is_active";

const CONTENT_COLUMNS: &str =
    "id, category_id, owner_id, title, body, kind, metadata_json, display_order, is_active";

/// [`Persistence`] over a local SQLite file.
///
/// Statements are short and run on the calling task while the connection
/// mutex is held; no lock is held across an `.await`.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (creating and migrating as needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(super::open_store(path)?))
    }

    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be migrated.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(super::open_in_memory()?))
    }

    /// Wrap an already migrated connection.
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn parse_column<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind: String = row.get(3)?;
    Ok(Category {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        kind: parse_column(3, &kind)?,
        parent_id: row.get(4)?,
        depth: row.get(5)?,
        display_order: row.get(6)?,
        is_active: row.get(7)?,
    })
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<Content> {
    let kind: String = row.get(5)?;
    let metadata: String = row.get(6)?;
    Ok(Content {
        id: row.get(0)?,
        category_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        kind: parse_column(5, &kind)?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        display_order: row.get(7)?,
        is_active: row.get(8)?,
    })
}

fn fetch_category(
    conn: &Connection,
    scope: &OwnerScope,
    id: CategoryId,
) -> Result<Category, PersistenceError> {
    conn.query_row(
        &format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories
             WHERE id = ?1 AND owner_id = ?2 AND domain = ?3"
        ),
        params![id, scope.owner_id, scope.domain.as_str()],
        category_from_row,
    )
    .optional()?
    .ok_or(PersistenceError::NotFound(EntityRef::Category(id)))
}

fn fetch_content(
    conn: &Connection,
    scope: &OwnerScope,
    id: ContentId,
) -> Result<Content, PersistenceError> {
    conn.query_row(
        &format!(
            "SELECT {CONTENT_COLUMNS} FROM contents
             WHERE id = ?1 AND owner_id = ?2 AND domain = ?3"
        ),
        params![id, scope.owner_id, scope.domain.as_str()],
        content_from_row,
    )
    .optional()?
    .ok_or(PersistenceError::NotFound(EntityRef::Content(id)))
}

#[async_trait]
impl Persistence for SqliteBackend {
    async fn list_categories(&self, scope: &OwnerScope) -> Result<Vec<Category>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories
             WHERE owner_id = ?1 AND domain = ?2
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![scope.owner_id, scope.domain.as_str()], category_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn create_category(
        &self,
        scope: &OwnerScope,
        new: NewCategory,
    ) -> Result<Category, PersistenceError> {
        let conn = self.lock();
        if let Some(parent_id) = new.parent_id {
            fetch_category(&conn, scope, parent_id)?;
        }
        let now = now_us();
        conn.execute(
            "INSERT INTO categories (
                owner_id, domain, name, kind, parent_id, depth, display_order,
                is_active, created_at_us, updated_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
            params![
                scope.owner_id,
                scope.domain.as_str(),
                new.name,
                new.kind.as_str(),
                new.parent_id,
                new.depth,
                new.display_order,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::trace!(%scope, id, "inserted category row");
        Ok(new.into_category(id, scope))
    }

    async fn update_category(
        &self,
        scope: &OwnerScope,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, PersistenceError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut category = fetch_category(&tx, scope, id)?;
        update.apply_to(&mut category);
        tx.execute(
            "UPDATE categories
             SET name = ?1, parent_id = ?2, depth = ?3, display_order = ?4,
                 is_active = ?5, updated_at_us = ?6
             WHERE id = ?7",
            params![
                category.name,
                category.parent_id,
                category.depth,
                category.display_order,
                category.is_active,
                now_us(),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(category)
    }

    async fn delete_category(&self, scope: &OwnerScope, id: CategoryId) -> Result<(), PersistenceError> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM categories WHERE id = ?1 AND owner_id = ?2 AND domain = ?3",
            params![id, scope.owner_id, scope.domain.as_str()],
        )?;
        if removed == 0 {
            return Err(PersistenceError::NotFound(EntityRef::Category(id)));
        }
        Ok(())
    }

    async fn list_contents(
        &self,
        scope: &OwnerScope,
        category_id: CategoryId,
    ) -> Result<Vec<Content>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents
             WHERE owner_id = ?1 AND domain = ?2 AND category_id = ?3
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![scope.owner_id, scope.domain.as_str(), category_id],
            content_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn create_content(
        &self,
        scope: &OwnerScope,
        new: NewContent,
    ) -> Result<Content, PersistenceError> {
        let conn = self.lock();
        fetch_category(&conn, scope, new.category_id)?;
        let now = now_us();
        conn.execute(
            "INSERT INTO contents (
                owner_id, domain, category_id, title, body, kind, metadata_json,
                display_order, is_active, created_at_us, updated_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
            params![
                scope.owner_id,
                scope.domain.as_str(),
                new.category_id,
                new.title,
                new.body,
                new.kind.as_str(),
                new.metadata.to_string(),
                new.display_order,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::trace!(%scope, id, "inserted content row");
        Ok(new.into_content(id, scope))
    }

    async fn update_content(
        &self,
        scope: &OwnerScope,
        id: ContentId,
        update: ContentUpdate,
    ) -> Result<Content, PersistenceError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if let Some(category_id) = update.category_id {
            fetch_category(&tx, scope, category_id)?;
        }
        let mut content = fetch_content(&tx, scope, id)?;
        update.apply_to(&mut content);
        tx.execute(
            "UPDATE contents
             SET title = ?1, category_id = ?2, display_order = ?3, is_active = ?4,
                 updated_at_us = ?5
             WHERE id = ?6",
            params![
                content.title,
                content.category_id,
                content.display_order,
                content.is_active,
                now_us(),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(content)
    }

    async fn delete_content(&self, scope: &OwnerScope, id: ContentId) -> Result<(), PersistenceError> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM contents WHERE id = ?1 AND owner_id = ?2 AND domain = ?3",
            params![id, scope.owner_id, scope.domain.as_str()],
        )?;
        if removed == 0 {
            return Err(PersistenceError::NotFound(EntityRef::Content(id)));
        }
        Ok(())
    }
}
