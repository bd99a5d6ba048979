use crate::cli::{Cli, Commands};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use vidstitch::engine::{
    self, EncoderAvailability, MediaRecord, MergeEvent, MergeOutcome, MergeService, ProgressSink,
    Toolchain,
};
use vidstitch::{config, logging};

/// Exit status after a user cancellation (same as SIGINT)
const EXIT_CANCELLED: i32 = 130;

pub fn run(cli: Cli) {
    if let Err(e) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Warning: {:#}", e);
    }

    let config = match config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Warning: {:#}", e);
            eprintln!("Using built-in defaults. Run 'vidstitch init-config' to recreate the config file.");
            config::Config::default()
        }
    };

    let mut tools = config.toolchain();
    if let Some(ffmpeg) = cli.ffmpeg {
        tools.ffmpeg = ffmpeg;
    }
    if let Some(ffprobe) = cli.ffprobe {
        tools.ffprobe = ffprobe;
    }

    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(&tools),
        Commands::Encoders => handle_encoders(&tools),
        Commands::Scan { directory } => handle_scan(directory),
        Commands::Probe { files, json } => handle_probe(&tools, files, json),
        Commands::Merge {
            files,
            output,
            hw,
            no_hw,
            json_events,
        } => handle_merge(
            &config,
            tools,
            files,
            output,
            Commands::hardware_override(hw, no_hw),
            json_events,
        ),
        Commands::InitConfig => handle_init_config(),
    }
}

/// Nothing can be merged without ffmpeg/ffprobe: stop before doing any work
fn require_tools(tools: &Toolchain) {
    if let Err(e) = tools.verify() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_check_ffmpeg(tools: &Toolchain) {
    match tools.ffmpeg_version() {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match tools.ffprobe_version() {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_encoders(tools: &Toolchain) {
    require_tools(tools);

    let availability = EncoderAvailability::detect(tools);
    if availability.is_empty() {
        println!("No hardware encoders detected (re-encoding uses libx264)");
        return;
    }

    println!("Hardware encoders:");
    for encoder in availability.encoders() {
        println!("- {} ({})", encoder.ffmpeg_name(), encoder.display_name());
    }
}

fn handle_scan(directory: Option<PathBuf>) {
    let dir = directory.unwrap_or_else(|| {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    });
    println!("Scanning directory: {}", dir.display());

    match engine::scan(&dir) {
        Ok(files) => {
            for file in &files {
                println!("- {}", file.display());
            }
            println!("Total videos: {}", files.len());
        }
        Err(e) => {
            eprintln!("Error scanning directory: {:#}", e);
            process::exit(1);
        }
    }
}

fn describe(record: &MediaRecord) -> String {
    let audio = if record.has_audio {
        format!(
            "{} Hz {}",
            record.audio_sample_rate, record.audio_channel_layout
        )
    } else {
        "no audio".to_string()
    };
    format!(
        "{}: {} {} {:.3} fps {}, {:.2}s, {}",
        record.file_name,
        record.codec,
        record.resolution,
        record.frame_rate,
        record.pix_fmt,
        record.duration,
        audio
    )
}

fn handle_probe(tools: &Toolchain, files: Vec<PathBuf>, json: bool) {
    require_tools(tools);

    let mut records = Vec::new();
    let mut failed = false;
    for (path, result) in engine::probe::probe_all(tools, &files) {
        match result {
            Ok(record) => {
                if json {
                    match serde_json::to_string(&record) {
                        Ok(line) => println!("{}", line),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                } else {
                    println!("{}", describe(&record));
                }
                records.push(record);
            }
            Err(e) => {
                eprintln!("Error probing {}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if !json && records.len() >= 2 {
        match engine::first_mismatch(&records) {
            None => println!("Fast merge ready: yes (stream copy, no re-encoding)"),
            Some(mismatch) => println!("Fast merge ready: no ({})", mismatch),
        }
    }

    if failed {
        process::exit(1);
    }
}

/// Renders merge events on stderr, keeping progress on one rewritten line
#[derive(Default)]
struct TerminalSink {
    mid_line: AtomicBool,
}

impl ProgressSink for TerminalSink {
    fn emit(&self, event: MergeEvent) {
        let mut stderr = std::io::stderr().lock();
        let was_mid_line = self.mid_line.swap(false, Ordering::SeqCst);
        match event {
            MergeEvent::Progress { message, .. } => {
                let _ = write!(stderr, "\r{}", message);
                let _ = stderr.flush();
                self.mid_line.store(true, Ordering::SeqCst);
            }
            MergeEvent::Status { message } => {
                if was_mid_line {
                    let _ = writeln!(stderr);
                }
                let _ = writeln!(stderr, "{}", message);
            }
            MergeEvent::Cancelled => {
                if was_mid_line {
                    let _ = writeln!(stderr);
                }
                let _ = writeln!(stderr, "Merge cancelled");
            }
        }
    }
}

/// One JSON object per event on stdout, as a UI bridge would forward them
struct JsonSink;

impl ProgressSink for JsonSink {
    fn emit(&self, event: MergeEvent) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", event.to_json_line());
        let _ = stdout.flush();
    }
}

/// Cancel the merge when "q" (or "cancel") is entered on stdin
fn spawn_cancel_listener(service: Arc<MergeService>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let cmd = line.trim();
            if cmd.eq_ignore_ascii_case("q") || cmd.eq_ignore_ascii_case("cancel") {
                service.cancel_current_merge();
                break;
            }
        }
    });
}

fn handle_merge(
    config: &config::Config,
    tools: Toolchain,
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
    hardware: Option<bool>,
    json_events: bool,
) {
    require_tools(&tools);

    let mut records = Vec::with_capacity(files.len());
    for path in &files {
        match engine::probe::probe_metadata(&tools, path) {
            Ok(record) => records.push(record),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }

    let output = match output {
        Some(path) => path,
        None => config.default_output_path(&files[0]),
    };

    let sink: Arc<dyn ProgressSink> = if json_events {
        Arc::new(JsonSink)
    } else {
        Arc::new(TerminalSink::default())
    };

    let service = MergeService::detect(tools, sink)
        .with_policy(config.encoder_policy())
        .with_normalize_settings(config.normalize_settings());
    let use_hardware = hardware.unwrap_or(config.encoding.use_hardware_encoding);
    if let Err(e) = service.set_hardware_preference(use_hardware) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    let service = Arc::new(service);

    if std::io::stdin().is_terminal() && !json_events {
        eprintln!("Merging {} videos into {} (enter q to cancel)", records.len(), output.display());
    }
    spawn_cancel_listener(Arc::clone(&service));

    match service.merge_records(records, output) {
        Ok(MergeOutcome::Completed(summary)) => {
            if json_events {
                eprintln!("{}", summary);
            } else {
                eprintln!();
                println!("{}", summary);
                if let Some(encoder) = &summary.encoder {
                    println!("Re-encoded with {}", encoder);
                }
            }
            process::exit(0);
        }
        Ok(MergeOutcome::Cancelled) => process::exit(EXIT_CANCELLED),
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    match config::Config::load() {
        Ok(cfg) => {
            match config::Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            match toml::to_string_pretty(&cfg) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{:#?}", cfg),
            }
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            let cfg = config::Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            } else {
                match config::Config::config_path() {
                    Ok(path) => println!("Default config saved to {}", path.display()),
                    Err(e) => println!("Default config saved (path unknown): {:#}", e),
                }
            }
        }
    }
}
