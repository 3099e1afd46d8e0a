//! SQLite catalog store behavior against a real database file.

use catalog_ingest::catalog::{CatalogStore, CatalogWriteError, ProductRecord, SqliteCatalogStore};
use catalog_ingest::model::{DraftStatus, ImportSource, ProductDraft};
use tempfile::TempDir;

fn record(title: &str, sku: Option<&str>, business: &str) -> ProductRecord {
    let mut draft = ProductDraft::empty();
    draft.title = title.to_string();
    draft.price = Some(12.5);
    draft.currency = Some("PEN".to_string());
    draft.sku = sku.map(String::from);
    draft.tags = vec!["abarrotes".to_string()];
    ProductRecord::from_draft(&draft, business, DraftStatus::Published, ImportSource::ManualComplete)
}

fn open_store(dir: &TempDir) -> SqliteCatalogStore {
    SqliteCatalogStore::open(&dir.path().join("catalog.db")).unwrap()
}

#[test]
fn records_survive_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = open_store(&dir);
        store.insert(&record("Arroz Extra 5kg", Some("ARR-5"), "biz-1")).unwrap()
    };

    let store = open_store(&dir);
    let loaded = store.get(&id).unwrap().unwrap();
    assert_eq!(loaded.title, "Arroz Extra 5kg");
    assert_eq!(loaded.tags, vec!["abarrotes".to_string()]);
    assert_eq!(loaded.currency.as_deref(), Some("PEN"));
    assert_eq!(store.count("biz-1").unwrap(), 1);
}

#[test]
fn title_prefix_search_matches_normalized_titles() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.insert(&record("Café Altomayo", None, "biz-1")).unwrap();
    store.insert(&record("CAFETERA Oster", None, "biz-1")).unwrap();
    store.insert(&record("Azúcar Rubia", None, "biz-1")).unwrap();

    // Accent-folded, case-insensitive prefix.
    let found = store.find_by_title_like("cafe", "biz-1", 10).unwrap();
    assert_eq!(found.len(), 2);

    let none = store.find_by_title_like("cafe", "biz-2", 10).unwrap();
    assert!(none.is_empty());
}

#[test]
fn sku_lookup_is_exact_and_scoped() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.insert(&record("Aceite Primor", Some("ACE-1"), "biz-1")).unwrap();

    let hit = store.find_by_sku("ACE-1", "biz-1").unwrap().unwrap();
    assert_eq!(hit.title, "Aceite Primor");
    assert!(store.find_by_sku("ACE-1", "biz-2").unwrap().is_none());
    assert!(store.find_by_sku("ACE-2", "biz-1").unwrap().is_none());
}

#[test]
fn duplicate_sku_conflicts_but_batch_continues() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let records = vec![
        record("Uno", Some("SKU-1"), "biz-1"),
        record("Dos", Some("SKU-1"), "biz-1"),
        record("Tres", None, "biz-1"),
        record("Cuatro", None, "biz-1"),
    ];
    let outcomes = store.insert_many(&records);

    assert!(outcomes[0].is_ok());
    assert!(matches!(outcomes[1], Err(CatalogWriteError::Conflict(_))));
    assert!(outcomes[2].is_ok());
    assert!(outcomes[3].is_ok());
    // The failure neither rolled back earlier writes nor blocked later ones.
    assert_eq!(store.count("biz-1").unwrap(), 3);
}
