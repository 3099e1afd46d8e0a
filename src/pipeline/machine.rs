//! The ingestion orchestrator.
//!
//! One pipeline instance drives one merchant session: a single active
//! draft, serialized transitions, and strictly sequential batch items.
//! Collaborators are injected behind trait objects so the whole machine
//! runs against mocks in tests.

use super::state::PipelineState;
use crate::ai::{AiAction, AiError, Enhancement, ExtractionClient};
use crate::batch::BatchController;
use crate::bulk::{BulkImportError, BulkImporter};
use crate::commit::{BatchCommitOutcome, CommitError, Committer};
use crate::dedup::DuplicateResolver;
use crate::enhance::EnhancementCoordinator;
use crate::model::{
    AnalysisResult, BulkImportStats, DraftStatus, ImportSource, InputKind, PhotoQuality,
    ProductDraft, RawInput, RecordId, UploadedAsset,
};
use crate::storage::StorageBroker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Transient failure: {0}")]
    TransientIo(String),

    #[error("AI provider error: {0}")]
    Ai(#[from] AiError),

    #[error("Commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("Bulk import failed: {0}")]
    Bulk(#[from] BulkImportError),

    #[error("Duplicate lookup failed: {0}")]
    DuplicateLookup(String),

    #[error("Another operation is in flight")]
    OperationInFlight,

    #[error("Operation {operation} is not valid in state {state}")]
    InvalidTransition {
        state: &'static str,
        operation: &'static str,
    },

    #[error("A save is in flight; the session cannot be closed")]
    SaveInFlight,
}

/// What `start` did with the supplied files.
#[derive(Debug)]
pub enum StartOutcome {
    /// A structured file went through the bulk sibling flow; the session
    /// is already terminal.
    BulkImported(BulkImportStats),
    /// The interactive path was entered; inspect the state for routing.
    Interactive,
}

/// What a `save` call led to.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Everything in the session is written; the pipeline is terminal.
    Committed(Vec<RecordId>),
    /// The save is parked in `DuplicateCheck`, awaiting a decision.
    DuplicatesFound(usize),
    /// The item was written and the next batch item is already analyzed.
    NextInBatch { saved: usize, remaining: usize },
    /// The item was written but the next batch item failed to load, so
    /// the session ended with what was committed. `dropped` counts the
    /// queued files that were never ingested.
    BatchInterrupted {
        committed: Vec<RecordId>,
        dropped: usize,
        reason: String,
    },
}

/// What became of the batch after one item was written.
enum Continuation {
    /// No more items; the session is terminal.
    Terminal,
    /// The next item is uploaded and analyzed.
    Rolled,
    /// Loading the next item failed; the session went terminal with the
    /// rest of the queue dropped.
    Interrupted { dropped: usize, reason: String },
}

/// Clears the in-flight flag when the operation ends, even on early
/// return or cancellation.
struct FlightGuard(Arc<AtomicBool>);

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, IngestError> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(Self(flag.clone()))
        } else {
            Err(IngestError::OperationInFlight)
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct IngestionPipeline {
    storage: Arc<dyn StorageBroker>,
    extractor: Arc<ExtractionClient>,
    resolver: DuplicateResolver,
    committer: Committer,
    bulk: Arc<dyn BulkImporter>,

    state: PipelineState,
    history: Vec<PipelineState>,
    draft: ProductDraft,
    analysis: Option<AnalysisResult>,
    enhancer: EnhancementCoordinator,
    batch: Option<BatchController>,
    committed_ids: Vec<RecordId>,
    pending_status: DraftStatus,
    in_flight: Arc<AtomicBool>,
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn StorageBroker>,
        extractor: Arc<ExtractionClient>,
        resolver: DuplicateResolver,
        committer: Committer,
        bulk: Arc<dyn BulkImporter>,
        enhancer: EnhancementCoordinator,
    ) -> Self {
        Self {
            storage,
            extractor,
            resolver,
            committer,
            bulk,
            state: PipelineState::Choose,
            history: Vec::new(),
            draft: ProductDraft::empty(),
            analysis: None,
            enhancer,
            batch: None,
            committed_ids: Vec::new(),
            pending_status: DraftStatus::Published,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn draft(&self) -> &ProductDraft {
        &self.draft
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// The asset lineage root, if an image was uploaded this item.
    pub fn original_asset(&self) -> Option<&UploadedAsset> {
        self.enhancer.original()
    }

    pub fn batch_saved_count(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.saved_count())
    }

    /// Whether closing now would lose work.
    pub fn is_dirty(&self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.draft.has_title()
            || !self.draft.description.trim().is_empty()
            || self.draft.price.is_some()
            || !self.enhancer.is_empty()
            || self.batch.as_ref().is_some_and(|b| !b.is_exhausted())
    }

    // =========================================================================
    // Session entry
    // =========================================================================

    /// Feed the session its input files.
    ///
    /// A single structured file (spreadsheet or document) is handed to
    /// the bulk importer and the session ends terminal. Images enter the
    /// interactive path, as a batch when there are several.
    pub async fn start(&mut self, inputs: Vec<RawInput>) -> Result<StartOutcome, IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state("start", &[PipelineState::Choose])?;
        if inputs.is_empty() {
            return Err(IngestError::Input("no files supplied".to_string()));
        }
        // A batch abandoned via back() must not bleed into this session.
        self.batch = None;
        self.committed_ids.clear();

        let structured = inputs
            .iter()
            .any(|i| matches!(i.kind, InputKind::Spreadsheet | InputKind::Document));
        if structured {
            if inputs.len() > 1 {
                return Err(IngestError::Input(
                    "structured files must be imported one at a time".to_string(),
                ));
            }
            let input = &inputs[0];
            info!(file = %input.original_name, kind = input.kind.as_str(), "Dispatching bulk import");
            let stats = self.bulk.import_bulk(input).await?;
            self.enter_terminal();
            return Ok(StartOutcome::BulkImported(stats));
        }

        let mut inputs = inputs;
        let first = if inputs.len() == 1 {
            inputs.remove(0)
        } else {
            info!(count = inputs.len(), "Starting batch session");
            let batch = BatchController::new(inputs);
            let first = batch
                .current()
                .cloned()
                .ok_or_else(|| IngestError::Input("empty batch".to_string()))?;
            self.batch = Some(batch);
            first
        };

        if let Err(e) = self.run_upload_cycle(first, true).await {
            self.batch = None;
            return Err(e);
        }
        Ok(StartOutcome::Interactive)
    }

    /// Skip AI entirely and open an empty draft for hand entry.
    pub fn start_manual(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        self.expect_state("start_manual", &[PipelineState::Choose])?;
        self.draft = ProductDraft::empty();
        self.analysis = None;
        self.enter(PipelineState::ManualEntry);
        Ok(())
    }

    // =========================================================================
    // Upload and analysis cycle
    // =========================================================================

    async fn run_upload_cycle(
        &mut self,
        input: RawInput,
        reset_draft: bool,
    ) -> Result<(), IngestError> {
        if reset_draft {
            self.draft = ProductDraft::empty();
            self.draft.import_source = ImportSource::ManualPhoto;
            self.analysis = None;
            self.enhancer.clear();
        }

        self.enter(PipelineState::Uploading);
        let asset = match self
            .storage
            .upload(&input.bytes, &input.content_type, &input.original_name)
            .await
        {
            Ok(asset) => asset,
            Err(e) => {
                // No partial state survives a failed upload.
                warn!(error = %e, file = %input.original_name, "Upload failed");
                self.state = self.history.pop().unwrap_or(PipelineState::Choose);
                return Err(IngestError::TransientIo(e.to_string()));
            }
        };

        self.enhancer.seed(asset.clone());
        self.draft.image_url = Some(asset.url.clone());

        self.state = PipelineState::Analyzing;
        let actions = [AiAction::Analyze, AiAction::DetectMulti, AiAction::Optimize];
        let outcome = self.extractor.infer(&asset.url, &actions, None).await?;

        if let Some(optimized) = &outcome.optimized_url {
            self.enhancer.supersede(UploadedAsset::image(optimized.clone()));
            self.draft.image_url = Some(optimized.clone());
        }

        let multi_actionable = outcome
            .multi_detect
            .as_ref()
            .is_some_and(|m| m.is_actionable());

        match &outcome.analysis {
            Some(analysis) => {
                self.draft.merge_analysis(analysis);
                self.analysis = Some(analysis.clone());
            }
            None if !multi_actionable => {
                // Extraction failed outright; degrade to hand editing
                // with the image attached rather than aborting.
                warn!(
                    failed = outcome.failed.len(),
                    "AI extraction failed, degrading to manual review"
                );
                self.state = PipelineState::Review;
                return Ok(());
            }
            None => {}
        }

        let poor_quality = self
            .analysis
            .as_ref()
            .is_some_and(|a| a.photo_quality == PhotoQuality::Poor);

        if poor_quality && !multi_actionable {
            let tips = self
                .analysis
                .as_ref()
                .map(|a| a.photo_tips.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| vec!["Usa mejor iluminación y enfoca el producto".to_string()]);
            debug!("Routing to quality tip");
            self.state = PipelineState::QualityTip { tips };
        } else if multi_actionable {
            let detect = outcome.multi_detect.clone().unwrap_or_default();
            debug!(count = detect.count, "Routing to multi-product split");
            self.state = PipelineState::MultiProductDetected { detect };
        } else {
            self.state = PipelineState::Review;
        }
        Ok(())
    }

    // =========================================================================
    // Quality tip decisions
    // =========================================================================

    /// Replace the poor photo with a fresh shot and re-run analysis.
    pub async fn retake(&mut self, input: RawInput) -> Result<(), IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state("retake", &[PipelineState::QualityTip { tips: Vec::new() }])?;
        self.run_upload_cycle(input, false).await
    }

    /// Accept the photo as-is and move on to editing.
    pub fn continue_anyway(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        self.expect_state(
            "continue_anyway",
            &[PipelineState::QualityTip { tips: Vec::new() }],
        )?;
        self.enter(PipelineState::Review);
        Ok(())
    }

    /// Throw the photo away and have the engine generate a product image
    /// from the draft title instead.
    pub async fn generate_instead(&mut self) -> Result<(), IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state(
            "generate_instead",
            &[PipelineState::QualityTip { tips: Vec::new() }],
        )?;

        let category = self.draft.category.clone();
        let category = (!category.trim().is_empty()).then_some(category);
        let asset = self
            .enhancer
            .enhance(Enhancement::Generate, &self.draft.title, category.as_deref())
            .await?;
        self.draft.image_url = Some(asset.url);
        self.draft.import_source = ImportSource::AiGeneratedImage;
        self.enter(PipelineState::Review);
        Ok(())
    }

    // =========================================================================
    // Multi-product decisions
    // =========================================================================

    /// Split the photo into one unpublished draft per detected product
    /// and commit them all in one pass.
    pub async fn save_separately(&mut self) -> Result<BatchCommitOutcome, IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        let detect = match &self.state {
            PipelineState::MultiProductDetected { detect } => detect.clone(),
            _ => {
                return Err(IngestError::InvalidTransition {
                    state: self.state.name(),
                    operation: "save_separately",
                })
            }
        };

        let image_url = self.draft.image_url.clone();
        let drafts: Vec<ProductDraft> = detect
            .products
            .iter()
            .map(|p| ProductDraft::from_detected(p, image_url.as_deref()))
            .collect();
        if drafts.is_empty() {
            return Err(IngestError::Input(
                "detection reported no products to split".to_string(),
            ));
        }

        info!(count = drafts.len(), "Saving detected products separately");
        self.state = PipelineState::Saving;
        let outcome = self.committer.commit_many(&drafts, DraftStatus::Draft);
        self.committed_ids.extend(outcome.succeeded.iter().cloned());
        self.finish_item().await;
        Ok(outcome)
    }

    /// Dismiss the split suggestion and edit the single-product analysis.
    pub fn treat_as_one(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        self.expect_state(
            "treat_as_one",
            &[PipelineState::MultiProductDetected {
                detect: Default::default(),
            }],
        )?;
        self.enter(PipelineState::Review);
        Ok(())
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Mutable access to the draft for field edits. No transition.
    pub fn draft_mut(&mut self) -> Result<&mut ProductDraft, IngestError> {
        self.check_not_in_flight()?;
        self.expect_state(
            "draft_mut",
            &[PipelineState::Review, PipelineState::ManualEntry],
        )?;
        Ok(&mut self.draft)
    }

    /// Apply one image transform on top of the current asset. The draft
    /// image is superseded; the original stays in the lineage.
    pub async fn enhance(&mut self, enhancement: Enhancement) -> Result<(), IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state("enhance", &[PipelineState::Review])?;

        let category = self.draft.category.clone();
        let category = (!category.trim().is_empty()).then_some(category);
        let asset = self
            .enhancer
            .enhance(enhancement, &self.draft.title, category.as_deref())
            .await?;
        self.draft.image_url = Some(asset.url);
        if enhancement == Enhancement::Generate {
            self.draft.import_source = ImportSource::AiGeneratedImage;
        }
        Ok(())
    }

    /// Restore the original upload as the draft image, dropping every
    /// derived asset.
    pub fn revert_image(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        self.expect_state("revert_image", &[PipelineState::Review])?;
        if let Some(original) = self.enhancer.revert_to_original() {
            self.draft.image_url = Some(original.url.clone());
        }
        Ok(())
    }

    /// Attach (or replace) a photo from an editing state and re-run the
    /// analysis cycle. Hand-edited fields survive where the new analysis
    /// comes back blank.
    pub async fn attach_photo(&mut self, input: RawInput) -> Result<(), IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state(
            "attach_photo",
            &[PipelineState::Review, PipelineState::ManualEntry],
        )?;
        self.run_upload_cycle(input, false).await
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Try to commit the draft with the requested status.
    ///
    /// The duplicate gate runs first: any candidate parks the save in
    /// `DuplicateCheck` instead of writing. The gate is advisory, the
    /// merchant can always `save_anyway`.
    pub async fn save(&mut self, status: DraftStatus) -> Result<SaveOutcome, IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state("save", &[PipelineState::Review, PipelineState::ManualEntry])?;
        if !self.draft.has_title() {
            return Err(IngestError::Commit(CommitError::EmptyTitle));
        }
        self.pending_status = status;

        let candidates = self
            .resolver
            .find_candidates(
                &self.draft.title,
                self.draft.sku.as_deref(),
                self.committer.business_id(),
            )
            .map_err(|e| IngestError::DuplicateLookup(e.to_string()))?;
        if !candidates.is_empty() {
            info!(count = candidates.len(), "Possible duplicates, parking save");
            let found = candidates.len();
            self.enter(PipelineState::DuplicateCheck { candidates });
            return Ok(SaveOutcome::DuplicatesFound(found));
        }

        self.do_commit().await
    }

    /// Commit despite the duplicate warning.
    pub async fn save_anyway(&mut self) -> Result<SaveOutcome, IngestError> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        self.expect_state(
            "save_anyway",
            &[PipelineState::DuplicateCheck {
                candidates: Vec::new(),
            }],
        )?;
        self.do_commit().await
    }

    /// Abandon the parked save and go back to editing.
    pub fn edit_instead(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        self.expect_state(
            "edit_instead",
            &[PipelineState::DuplicateCheck {
                candidates: Vec::new(),
            }],
        )?;
        self.enter(PipelineState::Review);
        Ok(())
    }

    async fn do_commit(&mut self) -> Result<SaveOutcome, IngestError> {
        self.state = PipelineState::Saving;
        let id = match self.committer.commit(&self.draft, self.pending_status) {
            Ok(id) => id,
            Err(e) => {
                // The draft survives a failed write; the merchant fixes
                // and retries from Review.
                warn!(error = %e, "Commit failed, returning to review");
                self.state = PipelineState::Review;
                return Err(IngestError::Commit(e));
            }
        };
        self.committed_ids.push(id);
        match self.finish_item().await {
            Continuation::Terminal => Ok(SaveOutcome::Committed(self.committed_ids.clone())),
            Continuation::Rolled => {
                let batch = self.batch.as_ref();
                Ok(SaveOutcome::NextInBatch {
                    saved: batch.map_or(0, |b| b.saved_count()),
                    remaining: batch.map_or(0, |b| b.remaining()),
                })
            }
            Continuation::Interrupted { dropped, reason } => Ok(SaveOutcome::BatchInterrupted {
                committed: self.committed_ids.clone(),
                dropped,
                reason,
            }),
        }
    }

    /// After a successful write: either roll the batch forward into the
    /// next item's upload cycle, or finish the session.
    ///
    /// The write already happened, so this never fails the caller. When
    /// the next item cannot be loaded the session goes terminal with the
    /// rest of the queue dropped; the cursor never moves past an item
    /// that was not committed.
    async fn finish_item(&mut self) -> Continuation {
        let next = match self.batch.as_mut() {
            Some(batch) => {
                batch.mark_saved();
                batch.advance().cloned()
            }
            None => None,
        };

        match next {
            Some(input) => {
                info!(file = %input.original_name, "Batch rolling to next item");
                self.history.clear();
                self.history.push(PipelineState::Choose);
                match self.run_upload_cycle(input, true).await {
                    Ok(()) => Continuation::Rolled,
                    Err(e) => {
                        let dropped = self.batch.as_ref().map_or(0, |b| b.remaining());
                        warn!(error = %e, dropped, "Batch continuation failed, ending session");
                        self.enter_terminal();
                        Continuation::Interrupted {
                            dropped,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            None => {
                info!(total = self.committed_ids.len(), "Session committed");
                self.enter_terminal();
                Continuation::Terminal
            }
        }
    }

    /// Go terminal: everything but the committed ids is released, so no
    /// operation can resurrect the session.
    fn enter_terminal(&mut self) {
        self.release_session();
        self.state = PipelineState::Committed {
            record_ids: self.committed_ids.clone(),
        };
    }

    fn release_session(&mut self) {
        self.history.clear();
        self.draft = ProductDraft::empty();
        self.analysis = None;
        self.enhancer.clear();
        self.batch = None;
    }

    // =========================================================================
    // Navigation and teardown
    // =========================================================================

    /// Step back to the previous held state. Transient and terminal
    /// states cannot be backed out of; data is never replayed or undone.
    pub fn back(&mut self) -> Result<(), IngestError> {
        self.check_not_in_flight()?;
        if self.state.is_transient() || self.state.is_terminal() {
            return Err(IngestError::InvalidTransition {
                state: self.state.name(),
                operation: "back",
            });
        }
        match self.history.pop() {
            Some(previous) => {
                debug!(from = self.state.name(), to = previous.name(), "Back");
                self.state = previous;
                Ok(())
            }
            None => Err(IngestError::InvalidTransition {
                state: self.state.name(),
                operation: "back",
            }),
        }
    }

    /// Discard the session. Refused only while a save is in flight.
    pub fn close(&mut self) -> Result<(), IngestError> {
        if matches!(self.state, PipelineState::Saving) || self.in_flight.load(Ordering::SeqCst) {
            return Err(IngestError::SaveInFlight);
        }
        self.release_session();
        self.committed_ids.clear();
        self.state = PipelineState::Choose;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn enter(&mut self, next: PipelineState) {
        if !self.state.is_transient() {
            self.history.push(self.state.clone());
        }
        debug!(from = self.state.name(), to = next.name(), "Transition");
        self.state = next;
    }

    fn check_not_in_flight(&self) -> Result<(), IngestError> {
        if self.in_flight.load(Ordering::SeqCst) {
            return Err(IngestError::OperationInFlight);
        }
        Ok(())
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[PipelineState],
    ) -> Result<(), IngestError> {
        let ok = allowed
            .iter()
            .any(|s| std::mem::discriminant(s) == std::mem::discriminant(&self.state));
        if ok {
            Ok(())
        } else {
            Err(IngestError::InvalidTransition {
                state: self.state.name(),
                operation,
            })
        }
    }
}
