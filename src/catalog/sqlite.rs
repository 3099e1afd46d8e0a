//! SQLite implementation of the catalog store.

use super::schema::{CATALOG_SCHEMA_SQL, CATALOG_SCHEMA_VERSION};
use super::{CandidateRecord, CatalogStore, CatalogWriteError, ProductRecord};
use crate::model::{DraftStatus, ImportSource, RecordId};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open or create a catalog database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database: {:?}", path))?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(CATALOG_SCHEMA_SQL)?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;
        if version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![CATALOG_SCHEMA_VERSION],
            )?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_candidate(row: &rusqlite::Row) -> rusqlite::Result<CandidateRecord> {
        Ok(CandidateRecord {
            id: RecordId(row.get("id")?),
            title: row.get("title")?,
            price: row.get("price")?,
            sku: row.get("sku")?,
            brand: row.get("brand")?,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ProductRecord> {
        let tags: Vec<String> = row
            .get::<_, String>("tags")
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let attributes = row
            .get::<_, String>("attributes")
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Ok(ProductRecord {
            id: RecordId(row.get("id")?),
            business_id: row.get("business_id")?,
            title: row.get("title")?,
            normalized_title: row.get("normalized_title")?,
            description: row.get("description")?,
            price: row.get("price")?,
            currency: row.get("currency")?,
            category: row.get("category")?,
            brand: row.get("brand")?,
            sku: row.get("sku")?,
            unit: row.get("unit")?,
            stock: row.get("stock")?,
            tags,
            image_url: row.get("image_url")?,
            attributes,
            status: DraftStatus::parse(&row.get::<_, String>("status")?)
                .unwrap_or(DraftStatus::Draft),
            import_source: ImportSource::parse(&row.get::<_, String>("import_source")?)
                .unwrap_or(ImportSource::ManualComplete),
            ai_confidence: row.get("ai_confidence")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Fetch a full record by id.
    pub fn get(&self, id: &RecordId) -> Result<Option<ProductRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM products WHERE id = ?1",
                params![id.0],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn find_by_title_like(
        &self,
        prefix: &str,
        scope: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, price, sku, brand FROM products
            WHERE business_id = ?1 AND normalized_title LIKE ?2
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![scope, pattern, limit as i64],
            Self::row_to_candidate,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn find_by_sku(&self, sku: &str, scope: &str) -> Result<Option<CandidateRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT id, title, price, sku, brand FROM products
                 WHERE business_id = ?1 AND sku = ?2",
                params![scope, sku],
                Self::row_to_candidate,
            )
            .optional()?;
        Ok(result)
    }

    fn insert(&self, record: &ProductRecord) -> Result<RecordId, CatalogWriteError> {
        if record.title.trim().is_empty() {
            return Err(CatalogWriteError::ValidationFailed(
                "title must not be empty".to_string(),
            ));
        }

        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| CatalogWriteError::Io(e.into()))?;
        let attributes = serde_json::to_string(&record.attributes)
            .map_err(|e| CatalogWriteError::Io(e.into()))?;

        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            r#"
            INSERT INTO products (
                id, business_id, title, normalized_title, description,
                price, currency, category, brand, sku, unit, stock,
                tags, image_url, attributes, status, import_source,
                ai_confidence, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19
            )
            "#,
            params![
                record.id.0,
                record.business_id,
                record.title,
                record.normalized_title,
                record.description,
                record.price,
                record.currency,
                record.category,
                record.brand,
                record.sku,
                record.unit,
                record.stock,
                tags,
                record.image_url,
                attributes,
                record.status.as_str(),
                record.import_source.as_str(),
                record.ai_confidence,
                record.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(record.id.clone()),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CatalogWriteError::Conflict(
                    msg.unwrap_or_else(|| "duplicate record".to_string()),
                ))
            }
            Err(e) => Err(CatalogWriteError::Io(e.into())),
        }
    }

    fn count(&self, scope: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM products WHERE business_id = ?1",
            params![scope],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
