// Running ffmpeg/ffprobe as child processes

use super::cancel::CancelToken;
use super::error::{RunError, ToolFailure};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Program name used in diagnostics ("ffmpeg", "/opt/bin/ffprobe" -> "ffprobe")
pub fn tool_name(cmd: &Command) -> String {
    let program = std::path::Path::new(cmd.get_program());
    program
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

/// Arguments of a command as owned strings
pub fn command_args(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect()
}

/// Format a command as a shell-safe string for logs
pub fn format_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(command_args(cmd));

    shlex::try_join(parts.iter().map(String::as_str)).unwrap_or_else(|_| parts.join(" "))
}

/// Run a short-lived command to completion and capture its output.
/// A non-zero exit becomes `RunError::Failed` with the captured stderr.
pub fn capture(mut cmd: Command) -> Result<Output, RunError> {
    let tool = tool_name(&cmd);
    debug!(command = %format_command(&cmd), "running");

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| RunError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(RunError::Failed(ToolFailure {
            tool,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }));
    }

    Ok(output)
}

/// Run a command under a cancel token.
///
/// Stdout is read line by line on the calling thread and handed to `on_line`;
/// stderr is collected on a helper thread for diagnostics. The child is reaped
/// only after both pipes closed. Returns the captured stderr on success.
pub fn run_cancellable(
    mut cmd: Command,
    cancel: &CancelToken,
    on_line: &mut dyn FnMut(&str),
) -> Result<String, RunError> {
    let tool = tool_name(&cmd);
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    debug!(command = %format_command(&cmd), "running");

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        tool: tool.clone(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let guard = match cancel.register(child) {
        Ok(guard) => guard,
        Err(mut child) => {
            // Cancelled between spawn and registration
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Cancelled);
        }
    };

    let stderr_thread = std::thread::spawn(move || {
        let mut stderr_output = String::new();
        if let Some(mut stderr) = stderr {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            stderr_output = String::from_utf8_lossy(&buf).to_string();
        }
        stderr_output
    });

    if let Some(stdout) = stdout {
        let reader = BufReader::new(stdout);
        for line in reader.lines().map_while(Result::ok) {
            on_line(&line);
        }
    }

    let stderr_output = stderr_thread
        .join()
        .unwrap_or_else(|_| "Failed to capture stderr".to_string());

    let status = guard.wait().map_err(|source| RunError::Io {
        tool: tool.clone(),
        source,
    })?;
    drop(guard);

    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    if !status.success() {
        return Err(RunError::Failed(ToolFailure {
            tool,
            exit_code: status.code(),
            stderr: stderr_output,
        }));
    }

    Ok(stderr_output)
}
