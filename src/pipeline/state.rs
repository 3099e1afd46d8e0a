//! States of the ingestion machine.
//!
//! Transitions, with transient states marked (*):
//!
//! ```text
//! Choose ──start──▶ Uploading* ──▶ Analyzing* ──▶ QualityTip
//!   │                   │                     ├─▶ MultiProductDetected
//!   │ start_manual      └─(broker failure     └─▶ Review
//!   ▼                      restores Choose)
//! ManualEntry ──save──▶ DuplicateCheck ──save_anyway──▶ Saving* ──▶ Committed
//! Review ─────save──▶       │ edit_instead                 │ (commit failure
//!                           ▼                              ▼  restores Review)
//!                         Review                    next batch item
//!                                                   re-enters Uploading*
//! ```

use crate::model::{DuplicateCandidate, MultiDetectResult, RecordId};

#[derive(Debug, Clone)]
pub enum PipelineState {
    /// Nothing in progress; awaiting input files or a manual start.
    Choose,
    /// An asset is being pushed to storage.
    Uploading,
    /// AI extraction is running against the uploaded asset.
    Analyzing,
    /// The photo is usable but poor; the merchant decides how to proceed.
    QualityTip { tips: Vec<String> },
    /// The photo appears to show several distinct products.
    MultiProductDetected { detect: MultiDetectResult },
    /// Hand entry of a draft with no AI involvement.
    ManualEntry,
    /// Draft editing: the merchant reviews and adjusts extracted fields.
    Review,
    /// Possible duplicates were found; the save is parked, not rejected.
    DuplicateCheck { candidates: Vec<DuplicateCandidate> },
    /// A commit is running against the catalog store.
    Saving,
    /// Terminal: everything in this session has been written.
    Committed { record_ids: Vec<RecordId> },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Choose => "choose",
            PipelineState::Uploading => "uploading",
            PipelineState::Analyzing => "analyzing",
            PipelineState::QualityTip { .. } => "quality_tip",
            PipelineState::MultiProductDetected { .. } => "multi_product_detected",
            PipelineState::ManualEntry => "manual_entry",
            PipelineState::Review => "review",
            PipelineState::DuplicateCheck { .. } => "duplicate_check",
            PipelineState::Saving => "saving",
            PipelineState::Committed { .. } => "committed",
        }
    }

    /// Transient states are passed through by an operation, never held
    /// between calls, and cannot be navigated back from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineState::Uploading | PipelineState::Analyzing | PipelineState::Saving
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Committed { .. })
    }
}
