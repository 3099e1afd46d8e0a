//! Scriptable AI provider doubles.

use async_trait::async_trait;
use catalog_ingest::ai::{AiError, Enhancement, ImageEngine, VisionProvider};
use catalog_ingest::model::{AnalysisResult, MultiDetectResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Vision provider returning pre-scripted results. Queued results are
/// consumed one per call; when the queue is empty the default applies.
pub struct ScriptedVisionProvider {
    analyses: Mutex<VecDeque<AnalysisResult>>,
    default_analysis: Mutex<Option<AnalysisResult>>,
    multi: Mutex<Option<MultiDetectResult>>,
    fail_all: Mutex<bool>,
    pub analyze_calls: AtomicUsize,
}

impl ScriptedVisionProvider {
    pub fn new() -> Self {
        Self {
            analyses: Mutex::new(VecDeque::new()),
            default_analysis: Mutex::new(None),
            multi: Mutex::new(None),
            fail_all: Mutex::new(false),
            analyze_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_analysis(&self, analysis: AnalysisResult) {
        *self.default_analysis.lock().unwrap() = Some(analysis);
    }

    pub fn queue_analysis(&self, analysis: AnalysisResult) {
        self.analyses.lock().unwrap().push_back(analysis);
    }

    pub fn set_multi(&self, multi: MultiDetectResult) {
        *self.multi.lock().unwrap() = Some(multi);
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }
}

#[async_trait]
impl VisionProvider for ScriptedVisionProvider {
    async fn analyze(&self, _image_url: &str) -> Result<AnalysisResult, AiError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_all.lock().unwrap() {
            return Err(AiError::Timeout);
        }
        if let Some(queued) = self.analyses.lock().unwrap().pop_front() {
            return Ok(queued);
        }
        self.default_analysis
            .lock()
            .unwrap()
            .clone()
            .ok_or(AiError::Timeout)
    }

    async fn detect_multi(&self, _image_url: &str) -> Result<MultiDetectResult, AiError> {
        if *self.fail_all.lock().unwrap() {
            return Err(AiError::Timeout);
        }
        Ok(self.multi.lock().unwrap().clone().unwrap_or_default())
    }
}

/// Image engine producing deterministic derived URLs.
pub struct ScriptedImageEngine {
    counter: AtomicUsize,
    fail_all: Mutex<bool>,
    pub calls: Mutex<Vec<(Enhancement, Option<String>, Option<String>)>>,
}

impl ScriptedImageEngine {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail_all: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ImageEngine for ScriptedImageEngine {
    async fn transform(
        &self,
        enhancement: Enhancement,
        image_url: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String, AiError> {
        self.calls.lock().unwrap().push((
            enhancement,
            image_url.map(String::from),
            prompt.map(String::from),
        ));
        if *self.fail_all.lock().unwrap() {
            return Err(AiError::Connection("engine down".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mem://derived/{}-{}.png", enhancement.as_str(), n))
    }
}
