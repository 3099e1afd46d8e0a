//! SQLite schema for the product catalog.

pub const CATALOG_SCHEMA_VERSION: i32 = 1;

pub const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    business_id TEXT NOT NULL,
    title TEXT NOT NULL,
    normalized_title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price REAL,
    currency TEXT,
    category TEXT NOT NULL DEFAULT '',
    brand TEXT,
    sku TEXT,
    unit TEXT NOT NULL DEFAULT 'unidad',
    stock INTEGER,
    tags TEXT NOT NULL DEFAULT '[]',
    image_url TEXT,
    attributes TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL,
    import_source TEXT NOT NULL,
    ai_confidence REAL,
    created_at INTEGER NOT NULL,
    UNIQUE (business_id, sku)
);

CREATE INDEX IF NOT EXISTS idx_products_business
    ON products (business_id);

CREATE INDEX IF NOT EXISTS idx_products_normalized_title
    ON products (business_id, normalized_title);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;
