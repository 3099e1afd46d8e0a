//! Duplicate Resolver.
//!
//! Recall-biased near-match detection against the existing catalog:
//! the first significant word of the normalized title seeds a prefix
//! query, and every returned record is scored with normalized edit
//! distance plus a containment boost. False positives are fine (the
//! merchant decides); false negatives are the failure mode to avoid.

use crate::catalog::CatalogStore;
use crate::model::DuplicateCandidate;
use std::sync::Arc;
use tracing::debug;

/// Minimum similarity for a record to be reported at all.
pub const DEFAULT_SIMILARITY_FLOOR: f32 = 0.6;

/// Upper bound on reported candidates.
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// How many records to pull from the store before scoring.
const RECALL_LIMIT: usize = 25;

pub struct DuplicateResolver {
    store: Arc<dyn CatalogStore>,
    similarity_floor: f32,
    max_candidates: usize,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_policy(mut self, similarity_floor: f32, max_candidates: usize) -> Self {
        self.similarity_floor = similarity_floor;
        self.max_candidates = max_candidates;
        self
    }

    /// Find near-duplicate catalog records for a candidate title.
    ///
    /// An exact SKU hit short-circuits with similarity 1.0. Results are
    /// ordered by descending similarity and capped.
    pub fn find_candidates(
        &self,
        title: &str,
        sku: Option<&str>,
        scope: &str,
    ) -> anyhow::Result<Vec<DuplicateCandidate>> {
        if let Some(sku) = sku.filter(|s| !s.trim().is_empty()) {
            if let Some(record) = self.store.find_by_sku(sku, scope)? {
                debug!(sku = %sku, "Exact SKU duplicate");
                return Ok(vec![DuplicateCandidate {
                    id: record.id,
                    title: record.title,
                    price: record.price,
                    similarity: 1.0,
                }]);
            }
        }

        let normalized = normalize_title(title);
        let Some(prefix) = first_significant_token(&normalized) else {
            return Ok(Vec::new());
        };

        let records = self
            .store
            .find_by_title_like(prefix, scope, RECALL_LIMIT)?;

        let mut candidates: Vec<DuplicateCandidate> = records
            .into_iter()
            .filter_map(|record| {
                let similarity = title_similarity(&normalized, &normalize_title(&record.title));
                if similarity >= self.similarity_floor {
                    Some(DuplicateCandidate {
                        id: record.id,
                        title: record.title,
                        price: record.price,
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.max_candidates);

        debug!(
            title = %title,
            prefix = %prefix,
            found = candidates.len(),
            "Duplicate scan complete"
        );

        Ok(candidates)
    }
}

/// Normalize for comparison: lowercase, fold Spanish accents, strip
/// punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        _ => c,
    }
}

/// First token with more than two characters, or the first token at all.
pub fn first_significant_token(normalized: &str) -> Option<&str> {
    normalized
        .split_whitespace()
        .find(|t| t.len() > 2)
        .or_else(|| normalized.split_whitespace().next())
}

/// Similarity in [0, 1] between two normalized titles. Full containment
/// of one title in the other gets a floor of 0.85 so "Taladro Bosch"
/// matches "Taladro Bosch 500W" strongly despite the length gap.
fn title_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = levenshtein_distance(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    let edit_similarity = 1.0 - (distance as f32 / max_len as f32);

    if a.contains(b) || b.contains(a) {
        edit_similarity.max(0.85)
    } else {
        edit_similarity
    }
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for i in 0..=m {
        dp[i][0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }

    dp[m][n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalogStore;
    use crate::model::{DraftStatus, ImportSource, ProductDraft, RecordId};

    fn store_with(titles: &[&str]) -> Arc<MemoryCatalogStore> {
        let store = Arc::new(MemoryCatalogStore::new());
        for title in titles {
            let mut draft = ProductDraft::empty();
            draft.title = title.to_string();
            let record = crate::catalog::ProductRecord::from_draft(
                &draft,
                "biz-1",
                DraftStatus::Published,
                ImportSource::ManualComplete,
            );
            store.insert(&record).unwrap();
        }
        store
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Taladro  Eléctrico, 500W! "),
            "taladro electrico 500w"
        );
    }

    #[test]
    fn test_first_significant_token_skips_short_words() {
        assert_eq!(first_significant_token("de la casa azul"), Some("casa"));
        assert_eq!(first_significant_token("tv"), Some("tv"));
        assert_eq!(first_significant_token(""), None);
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_containment_boost() {
        let a = normalize_title("Taladro Bosch");
        let b = normalize_title("Taladro Bosch 500W Profesional");
        assert!(title_similarity(&a, &b) >= 0.85);
    }

    #[test]
    fn test_find_candidates_filters_and_sorts() {
        let store = store_with(&[
            "Taladro Bosch 500W",
            "Taladro Makita 700W",
            "Sierra circular Dewalt",
        ]);
        let resolver = DuplicateResolver::new(store);

        let candidates = resolver
            .find_candidates("Taladro Bosch", None, "biz-1")
            .unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates[0].title.contains("Bosch"));
        assert!(candidates
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert!(candidates.iter().all(|c| c.similarity >= 0.6));
    }

    #[test]
    fn test_no_candidates_for_unrelated_title() {
        let store = store_with(&["Sierra circular Dewalt"]);
        let resolver = DuplicateResolver::new(store);
        let candidates = resolver
            .find_candidates("Licuadora Oster", None, "biz-1")
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_exact_sku_short_circuits() {
        let store = Arc::new(MemoryCatalogStore::new());
        let mut draft = ProductDraft::empty();
        draft.title = "Guantes de nitrilo".to_string();
        draft.sku = Some("SKU-99".to_string());
        let record = crate::catalog::ProductRecord::from_draft(
            &draft,
            "biz-1",
            DraftStatus::Published,
            ImportSource::ManualComplete,
        );
        let id: RecordId = store.insert(&record).unwrap();

        let resolver = DuplicateResolver::new(store);
        let candidates = resolver
            .find_candidates("Otro titulo totalmente", Some("SKU-99"), "biz-1")
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, id);
        assert_eq!(candidates[0].similarity, 1.0);
    }
}
