//! Merge orchestration: fast stream copy first, normalization as fallback.
//!
//! `MergeService` is the surface a host (CLI, UI bridge) talks to. It owns the
//! toolchain, the encoder availability snapshot taken at construction and the
//! hardware preference. One merge runs at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, info_span, warn};

use super::cancel::CancelToken;
use super::compat::{first_mismatch, is_fast_mergeable};
use super::concat::{concat, try_fast_merge};
use super::core::{
    ConcatMode, IntermediateFormat, MediaRecord, MergeOutcome, MergeRequest, MergeStrategy,
    MergeSummary, NormalizeSettings, Toolchain, scan,
};
use super::error::{MergeError, ProbeError, RunError};
use super::events::{MergeEvent, NullSink, ProgressSink};
use super::hardware::{EncoderAvailability, EncoderChoice, EncoderPolicy, select_encoder_for};
use super::probe;
use super::worker::{NormalizeJob, normalize};

pub struct MergeService {
    tools: Toolchain,
    availability: EncoderAvailability,
    policy: EncoderPolicy,
    settings: NormalizeSettings,
    use_hardware: AtomicBool,
    active: Mutex<Option<CancelToken>>,
    sink: Arc<dyn ProgressSink>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the active merge slot when the merge returns by any path
struct ActiveMerge<'a> {
    slot: &'a Mutex<Option<CancelToken>>,
}

impl Drop for ActiveMerge<'_> {
    fn drop(&mut self) {
        lock(self.slot).take();
    }
}

/// Deletes a partially written output unless disarmed
struct PartialOutput<'a> {
    path: &'a Path,
    armed: bool,
}

impl PartialOutput<'_> {
    fn remove_now(&self) {
        if self.armed && self.path.exists() {
            if let Err(e) = std::fs::remove_file(self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial output");
            }
        }
    }
}

impl Drop for PartialOutput<'_> {
    fn drop(&mut self) {
        self.remove_now();
    }
}

impl MergeService {
    /// Create a service with an already detected availability snapshot
    pub fn new(
        tools: Toolchain,
        availability: EncoderAvailability,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            tools,
            availability,
            policy: EncoderPolicy::default(),
            settings: NormalizeSettings::default(),
            use_hardware: AtomicBool::new(false),
            active: Mutex::new(None),
            sink,
        }
    }

    /// Detect hardware encoders with the given toolchain and build a service
    pub fn detect(tools: Toolchain, sink: Arc<dyn ProgressSink>) -> Self {
        let availability = EncoderAvailability::detect(&tools);
        Self::new(tools, availability, sink)
    }

    pub fn with_policy(mut self, policy: EncoderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_normalize_settings(mut self, settings: NormalizeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Video files under `dir`, sorted
    pub fn list_selectable_videos(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        scan(dir)
    }

    pub fn probe(&self, path: &Path) -> Result<MediaRecord, ProbeError> {
        probe::probe(&self.tools, path)
    }

    pub fn probe_all(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<MediaRecord, ProbeError>)> {
        probe::probe_all(&self.tools, paths)
    }

    /// Change the hardware preference. Refused while a merge is running.
    pub fn set_hardware_preference(&self, enabled: bool) -> Result<(), MergeError> {
        let active = lock(&self.active);
        if active.is_some() {
            return Err(MergeError::AlreadyRunning);
        }
        self.use_hardware.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn hardware_preference(&self) -> bool {
        self.use_hardware.load(Ordering::SeqCst)
    }

    pub fn list_available_hardware_encoders(&self) -> Vec<String> {
        self.availability.names()
    }

    pub fn is_fast_mergeable(&self, records: &[MediaRecord]) -> bool {
        is_fast_mergeable(records)
    }

    pub fn is_merging(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Cancel the running merge. Safe to call at any time; returns whether a
    /// merge was actually running.
    ///
    /// `MergeEvent::Cancelled` is emitted by the merge itself once it has
    /// stopped, and only if it really ended cancelled.
    pub fn cancel_current_merge(&self) -> bool {
        let token = lock(&self.active).clone();
        match token {
            Some(token) => {
                info!("cancelling current merge");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Merge records in order into `output`, using the current hardware preference
    pub fn merge_records(
        &self,
        records: Vec<MediaRecord>,
        output: impl Into<PathBuf>,
    ) -> Result<MergeOutcome, MergeError> {
        let request = MergeRequest::new(records, output, self.hardware_preference());
        self.merge(request)
    }

    /// Run one merge request to a terminal state
    pub fn merge(&self, request: MergeRequest) -> Result<MergeOutcome, MergeError> {
        let span = info_span!("merge", merge_id = %request.id, inputs = request.records.len());
        let _entered = span.enter();

        if request.records.len() < 2 {
            return Err(MergeError::TooFewInputs(request.records.len()));
        }

        let output = &request.output_path;
        if let Some(clash) = request
            .records
            .iter()
            .find(|r| same_file(&r.path, output))
        {
            return Err(MergeError::OutputIsInput(clash.path.clone()));
        }

        let token = {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(MergeError::AlreadyRunning);
            }
            let token = CancelToken::new();
            *active = Some(token.clone());
            token
        };
        let _active = ActiveMerge { slot: &self.active };

        // Fixed for the whole merge, even if the preference changes later
        let format = IntermediateFormat::for_output(output);
        let encoder =
            select_encoder_for(format, request.use_hardware, &self.availability, &self.policy);
        let output_existed = output.exists();

        match self.run(&request, &token, &encoder, format, output_existed) {
            Ok(summary) => {
                if token.is_cancelled() {
                    // Cancel arrived after the output was complete; keep it
                    info!("cancel requested after merge finished, keeping output");
                }
                info!(output = %summary.output_path.display(), strategy = %summary.strategy, "merge finished");
                Ok(MergeOutcome::Completed(summary))
            }
            Err(MergeError::Cancelled) => {
                info!("merge cancelled");
                self.sink.emit(MergeEvent::Cancelled);
                Ok(MergeOutcome::Cancelled)
            }
            Err(e) if token.is_cancelled() => {
                // A kill during cancellation surfaces as a tool failure
                info!(error = %e, "merge cancelled");
                self.sink.emit(MergeEvent::Cancelled);
                Ok(MergeOutcome::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "merge failed");
                Err(e)
            }
        }
    }

    /// Fast path, then normalization and the final concat.
    ///
    /// Each stage runs in its own child scope of `token`, so a failed fast
    /// attempt leaves nothing behind that the normalization stage inherits.
    /// A user cancel is different from a failed attempt: it ends the merge
    /// at whatever stage it lands, the fast path included, with no partial
    /// output. The request is left untouched and can be submitted again.
    fn run(
        &self,
        request: &MergeRequest,
        token: &CancelToken,
        encoder: &EncoderChoice,
        format: IntermediateFormat,
        output_existed: bool,
    ) -> Result<MergeSummary, MergeError> {
        let output = request.output_path.as_path();
        let total_duration_s = request.total_duration();
        let inputs = request.input_paths();

        // Fast path: stream copy of the originals
        if is_fast_mergeable(&request.records) {
            self.sink
                .emit(MergeEvent::status("Compatible videos detected, merging without re-encoding..."));

            let attempt = token.child();
            let mut partial = PartialOutput {
                path: output,
                armed: !output_existed,
            };
            match try_fast_merge(&self.tools, &attempt, &inputs, output) {
                Ok(()) => {
                    partial.armed = false;
                    self.sink.emit(MergeEvent::progress(100.0, total_duration_s, total_duration_s));
                    return Ok(MergeSummary {
                        output_path: output.to_path_buf(),
                        strategy: MergeStrategy::FastCopy,
                        inputs: request.records.len(),
                        total_duration_s,
                        encoder: None,
                    });
                }
                Err(RunError::Cancelled) => return Err(MergeError::Cancelled),
                Err(e) => {
                    warn!(error = %e.diagnostic(), "fast merge failed, falling back to re-encoding");
                    partial.remove_now();
                }
            }
        } else if let Some(mismatch) = first_mismatch(&request.records) {
            info!(%mismatch, "inputs differ, re-encoding required");
        }

        if token.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        // Slow path: normalize everything, then stream copy the intermediates
        self.sink.emit(MergeEvent::status("Starting re-encoding process..."));
        let attempt = token.child();

        let work_dir = tempfile::Builder::new()
            .prefix("vidstitch-normalize-")
            .tempdir()
            .map_err(|e| MergeError::io("failed to create temporary directory", e))?;

        let settings = format.settings(&self.settings);
        let job = NormalizeJob::new(&request.records, encoder, &settings, format, work_dir.path());
        let normalized = normalize(&self.tools, &job, &attempt, self.sink.as_ref())?;

        if attempt.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        self.sink.emit(MergeEvent::status("Merging normalized videos..."));
        let mut partial = PartialOutput {
            path: output,
            armed: !output_existed,
        };
        match concat(
            &self.tools,
            &attempt,
            &normalized,
            output,
            ConcatMode::Final,
            total_duration_s,
            self.sink.as_ref(),
        ) {
            Ok(()) => partial.armed = false,
            Err(RunError::Cancelled) => return Err(MergeError::Cancelled),
            Err(e) => {
                return Err(MergeError::Concat {
                    diagnostic: e.diagnostic(),
                });
            }
        }
        drop(partial);

        // work_dir (and every intermediate) is removed when it drops here
        Ok(MergeSummary {
            output_path: output.to_path_buf(),
            strategy: MergeStrategy::Normalized,
            inputs: request.records.len(),
            total_duration_s,
            encoder: Some(encoder.name.clone()),
        })
    }
}

impl Default for MergeService {
    fn default() -> Self {
        Self::new(
            Toolchain::default(),
            EncoderAvailability::default(),
            Arc::new(NullSink),
        )
    }
}

/// Same file on disk (or same path when neither exists yet)
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
