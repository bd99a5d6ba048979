//! Concat-demuxer manifest and execution

use crate::engine::cancel::CancelToken;
use crate::engine::core::{ConcatMode, ProgressParser, Toolchain, build_concat_cmd};
use crate::engine::error::RunError;
use crate::engine::events::{MergeEvent, NullSink, ProgressSink};
use crate::engine::process::run_cancellable;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Escape a path for a `file '...'` manifest line.
///
/// Single quotes close the quoted string, add an escaped quote and reopen it
/// (`'\''`). With `escape_backslashes` (Windows separators) every backslash is
/// doubled first.
pub fn escape_manifest_path_with(path: &str, escape_backslashes: bool) -> String {
    let path = if escape_backslashes {
        path.replace('\\', "\\\\")
    } else {
        path.to_string()
    };
    path.replace('\'', "'\\''")
}

/// Escape a path using the platform's separator rules
pub fn escape_manifest_path(path: &Path) -> String {
    escape_manifest_path_with(&path.to_string_lossy(), cfg!(windows))
}

/// Manifest text, one `file '<path>'` line per input in order
pub fn render_manifest(paths: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in paths {
        // The demuxer resolves relative entries against the manifest's directory
        let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
        out.push_str("file '");
        out.push_str(&escape_manifest_path(&path));
        out.push_str("'\n");
    }
    out
}

/// Write the manifest to a temp file removed when the handle drops
pub fn write_manifest(paths: &[PathBuf]) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("vidstitch-list-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(render_manifest(paths).as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Run one concat of `paths` into `output`.
///
/// In `Final` mode ffmpeg's `-progress` stream is parsed and forwarded to
/// `sink` as percentages of `total_duration_s`; `progress=end` forces 100.
pub fn concat(
    tools: &Toolchain,
    cancel: &CancelToken,
    paths: &[PathBuf],
    output: &Path,
    mode: ConcatMode,
    total_duration_s: f64,
    sink: &dyn ProgressSink,
) -> Result<(), RunError> {
    let manifest = write_manifest(paths).map_err(|source| RunError::Io {
        tool: "ffmpeg".to_string(),
        source,
    })?;
    debug!(manifest = %manifest.path().display(), inputs = paths.len(), ?mode, "concat manifest written");

    let cmd = build_concat_cmd(tools, manifest.path(), output, mode);
    let mut parser = ProgressParser::new();

    let mut on_line = |line: &str| {
        if mode != ConcatMode::Final {
            return;
        }
        parser.parse_line(line);
        // ffmpeg finishes each progress block with a progress=continue|end line
        if line.starts_with("progress=") {
            let pct = parser.progress_pct(total_duration_s);
            sink.emit(MergeEvent::progress(
                pct,
                parser.out_time_s().min(total_duration_s.max(0.0)),
                total_duration_s,
            ));
        }
    };

    run_cancellable(cmd, cancel, &mut on_line)?;
    Ok(())
}

/// Stream-copy the original inputs with strict error handling.
///
/// Returns the raw tool error (with ffmpeg's diagnostic) on failure; falling
/// back to normalization is the caller's decision.
pub fn try_fast_merge(
    tools: &Toolchain,
    cancel: &CancelToken,
    paths: &[PathBuf],
    output: &Path,
) -> Result<(), RunError> {
    concat(
        tools,
        cancel,
        paths,
        output,
        ConcatMode::Fast,
        0.0,
        &NullSink,
    )
}
