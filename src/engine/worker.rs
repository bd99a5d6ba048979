// Parallel normalization of merge inputs

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::core::{
    AudioPlan, IntermediateFormat, MediaRecord, NormalizeSettings, Resolution, Toolchain,
    build_normalize_cmd, display_name,
};
use super::error::{MergeError, RunError};
use super::events::{MergeEvent, ProgressSink};
use super::hardware::EncoderChoice;
use super::process::run_cancellable;

/// Message from a normalization task to the orchestrating thread
#[derive(Debug)]
pub enum WorkerMessage {
    /// Task spawned its ffmpeg process
    TaskStarted { index: usize },

    /// Task finished writing its intermediate
    TaskCompleted { index: usize, output: PathBuf },

    /// Task failed (or was cancelled)
    TaskFailed { index: usize, error: RunError },
}

/// Largest width across the inputs, paired with that input's height.
/// On ties the earliest input wins.
pub fn target_resolution(records: &[MediaRecord]) -> Resolution {
    records
        .iter()
        .map(|r| r.resolution)
        .fold(Resolution::default(), |best, r| {
            if r.width > best.width { r } else { best }
        })
}

/// True only when some inputs have audio and some don't
pub fn needs_audio_normalization(records: &[MediaRecord]) -> bool {
    let with_audio = records.iter().filter(|r| r.has_audio).count();
    with_audio > 0 && with_audio < records.len()
}

/// Intermediate file for input `index`
pub fn normalized_path(work_dir: &Path, index: usize, format: IntermediateFormat) -> PathBuf {
    work_dir.join(format!("normalized-{:03}.{}", index, format.extension()))
}

/// Everything the normalization fan-out needs for one merge
#[derive(Debug, Clone)]
pub struct NormalizeJob<'a> {
    pub records: &'a [MediaRecord],
    pub target: Resolution,
    pub encoder: &'a EncoderChoice,
    pub audio_normalization: bool,
    pub settings: &'a NormalizeSettings,
    pub format: IntermediateFormat,
    pub work_dir: &'a Path,
}

impl<'a> NormalizeJob<'a> {
    pub fn new(
        records: &'a [MediaRecord],
        encoder: &'a EncoderChoice,
        settings: &'a NormalizeSettings,
        format: IntermediateFormat,
        work_dir: &'a Path,
    ) -> Self {
        Self {
            records,
            target: target_resolution(records),
            encoder,
            audio_normalization: needs_audio_normalization(records),
            settings,
            format,
            work_dir,
        }
    }
}

/// Re-encode every input concurrently, one ffmpeg per input.
///
/// Returns the intermediates in input order. The first failure cancels the
/// remaining tasks; the call returns only after every task has exited.
pub fn normalize(
    tools: &Toolchain,
    job: &NormalizeJob<'_>,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<Vec<PathBuf>, MergeError> {
    let total = job.records.len();
    let scope = cancel.child();
    let (tx, rx) = mpsc::channel::<WorkerMessage>();

    info!(
        inputs = total,
        target = %job.target,
        encoder = %job.encoder.name,
        audio_normalization = job.audio_normalization,
        "normalizing inputs"
    );

    let mut slots: Vec<Option<PathBuf>> = vec![None; total];
    let mut first_error: Option<MergeError> = None;

    thread::scope(|s| {
        for (index, record) in job.records.iter().enumerate() {
            let tx = tx.clone();
            let scope = scope.clone();
            s.spawn(move || {
                let output = normalized_path(job.work_dir, index, job.format);
                let audio = AudioPlan::for_input(record.has_audio, job.audio_normalization);
                let cmd = build_normalize_cmd(
                    tools,
                    &record.path,
                    &output,
                    job.target,
                    job.encoder,
                    audio,
                    job.settings,
                );

                let _ = tx.send(WorkerMessage::TaskStarted { index });
                let message = match run_cancellable(cmd, &scope, &mut |_| {}) {
                    Ok(_) => WorkerMessage::TaskCompleted { index, output },
                    Err(error) => WorkerMessage::TaskFailed { index, error },
                };
                let _ = tx.send(message);
            });
        }
        // Only the task senders remain; the loop ends once every task is done
        drop(tx);

        let mut completed = 0;
        for message in rx.iter() {
            match message {
                WorkerMessage::TaskStarted { index } => {
                    debug!(index, "normalization task started");
                    sink.emit(MergeEvent::status(format!(
                        "Normalizing {} ({}/{})...",
                        display_name(&job.records[index].path),
                        index + 1,
                        total
                    )));
                }
                WorkerMessage::TaskCompleted { index, output } => {
                    completed += 1;
                    debug!(index, output = %output.display(), "normalization task completed");
                    slots[index] = Some(output);
                    sink.emit(MergeEvent::status(format!(
                        "Normalized {} of {} videos",
                        completed, total
                    )));
                }
                WorkerMessage::TaskFailed { index, error } => {
                    if first_error.is_some() {
                        // Siblings killed by the scope cancellation
                        continue;
                    }
                    let error = match error {
                        RunError::Cancelled => MergeError::Cancelled,
                        other => {
                            let path = job.records[index].path.clone();
                            warn!(index, path = %path.display(), error = %other, "normalization failed");
                            MergeError::Normalization {
                                index,
                                path,
                                diagnostic: other.diagnostic(),
                            }
                        }
                    };
                    first_error = Some(error);
                    scope.cancel();
                }
            }
        }
    });

    if let Some(error) = first_error {
        return Err(error);
    }
    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| MergeError::Normalization {
                index,
                path: job.records[index].path.clone(),
                diagnostic: "task finished without output".to_string(),
            })
        })
        .collect()
}
