//! TransferBox - Command-line interface for the verified media transfer engine.
//!
//! Thin demonstration binary: wires the engine to a real filesystem
//! `Storage` and a stderr `DisplaySink`. Configuration loading and argument
//! parsing beyond these flags are out of scope for the engine itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use clap::Parser;

use engine::{
    Config, DisplaySink, Metadata, MetadataValue, Storage, TransferOutcome, TransferProgress,
    VolumeInfo,
};

#[derive(Parser, Debug)]
#[command(name = "transfer")]
#[command(version = "0.1.0")]
#[command(about = "Verified media transfer: copy, checksum, and manifest a source volume")]
struct Args {
    /// Source directory (e.g. a mounted camera card)
    #[arg(long, value_name = "PATH")]
    src: PathBuf,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Restrict to files whose extension is in --extensions
    #[arg(long)]
    media_only: bool,

    /// Comma-separated, dot-prefixed extensions, e.g. ".mp4,.mov"
    #[arg(long, value_name = "EXTS", default_value = "")]
    extensions: String,

    /// Skip the post-copy checksum verification pass
    #[arg(long)]
    no_verify: bool,

    /// Skip ASC-MHL manifest generation
    #[arg(long)]
    no_mhl: bool,

    /// Organize destination by date
    #[arg(long)]
    date_folders: bool,

    /// Organize destination by source device name
    #[arg(long)]
    device_folders: bool,

    /// Rename files using their modification time instead of preserving the
    /// original name
    #[arg(long)]
    rename_with_timestamp: bool,
}

/// Real filesystem `Storage`. Volume discovery/eject are out of this
/// engine's scope; this implementation only backs the checks the
/// orchestrator actually needs (mount status, free space, best-effort
/// metadata).
struct FsStorage;

impl Storage for FsStorage {
    fn available_volumes(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn volume_info(&self, path: &Path) -> Result<VolumeInfo, engine::TransferError> {
        #[cfg(unix)]
        {
            use std::ffi::CString;
            use std::mem::MaybeUninit;
            use std::os::unix::ffi::OsStrExt;

            let c_path = CString::new(path.as_os_str().as_bytes())
                .map_err(|_| engine::TransferError::io(path, std::io::Error::from_raw_os_error(libc::EINVAL)))?;
            unsafe {
                let mut stat = MaybeUninit::<libc::statvfs>::uninit();
                if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
                    return Err(engine::TransferError::io(path, std::io::Error::last_os_error()));
                }
                let stat = stat.assume_init();
                let total = stat.f_blocks as u64 * stat.f_frsize as u64;
                let free = stat.f_bavail as u64 * stat.f_frsize as u64;
                Ok(VolumeInfo {
                    total,
                    used: total.saturating_sub(free),
                    free,
                })
            }
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(VolumeInfo { total: 0, used: 0, free: u64::MAX })
        }
    }

    fn is_mounted(&self, path: &Path) -> bool {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let Ok(meta) = std::fs::metadata(path) else {
                return false;
            };
            match path.parent() {
                Some(parent) if parent != path => match std::fs::metadata(parent) {
                    Ok(parent_meta) => parent_meta.dev() != meta.dev(),
                    Err(_) => true,
                },
                _ => true,
            }
        }
        #[cfg(not(unix))]
        {
            path.exists()
        }
    }

    fn wait_for_new_volume(&self, initial: &[PathBuf]) -> PathBuf {
        initial.first().cloned().unwrap_or_default()
    }

    fn wait_for_removal(&self, _path: &Path) {}

    fn unmount(&self, _path: &Path) -> bool {
        false
    }

    fn read_metadata(&self, path: &Path) -> Metadata {
        let mut metadata = Metadata::new();
        if let Ok(meta) = std::fs::metadata(path) {
            if let Ok(modified) = meta.modified() {
                metadata.insert(
                    "modified".to_string(),
                    MetadataValue::Timestamp(modified),
                );
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                metadata.insert(
                    "mode".to_string(),
                    MetadataValue::Integer(meta.permissions().mode() as i64),
                );
            }
        }
        metadata
    }

    fn apply_metadata(&self, path: &Path, metadata: &Metadata) -> bool {
        let mut ok = true;
        if let Some(MetadataValue::Timestamp(modified)) = metadata.get("modified") {
            let ft = filetime::FileTime::from_system_time(*modified);
            if filetime::set_file_mtime(path, ft).is_err() {
                ok = false;
            }
        }
        #[cfg(unix)]
        if let Some(MetadataValue::Integer(mode)) = metadata.get("mode") {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(*mode as u32);
            if std::fs::set_permissions(path, perms).is_err() {
                ok = false;
            }
        }
        ok
    }
}

/// Stderr display sink: status lines, a single-line progress bar, and
/// error lines.
struct CliSink {
    last_update: std::sync::Mutex<Instant>,
}

impl CliSink {
    fn new() -> Self {
        CliSink {
            last_update: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;
        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }
        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn bar(percent: u32) -> String {
        let filled = (percent / 5) as usize;
        let empty = 20usize.saturating_sub(filled);
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl DisplaySink for CliSink {
    fn show_status(&self, message: &str, _line: u32) {
        eprintln!("{message}");
    }

    fn show_progress(&self, snapshot: &TransferProgress) {
        let mut last = self.last_update.lock().unwrap();
        if last.elapsed().as_millis() < 100 {
            return;
        }
        *last = Instant::now();

        let percent = (snapshot.overall_progress * 100.0).round() as u32;
        eprint!(
            "\r{} | {}/{} files | {} | {}/s   ",
            Self::bar(percent),
            snapshot.file_index,
            snapshot.total_files,
            Self::format_bytes(snapshot.total_bytes_transferred_session),
            Self::format_bytes(snapshot.speed_bytes_per_sec as u64),
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn show_error(&self, message: &str) {
        eprintln!("\nError: {message}");
    }

    fn clear(&self, _preserve_errors: bool) {
        eprintln!();
    }
}

fn parse_extensions(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn build_config(args: &Args) -> Config {
    Config {
        media_only_transfer: args.media_only,
        media_extensions: parse_extensions(&args.extensions),
        create_date_folders: args.date_folders,
        create_device_folders: args.device_folders,
        rename_with_timestamp: args.rename_with_timestamp,
        verify_transfers: !args.no_verify,
        create_mhl_files: !args.no_mhl,
        ..Config::default()
    }
    .normalized()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    std::process::exit(run_cli(&args));
}

fn run_cli(args: &Args) -> i32 {
    let config = build_config(args);
    let mut state = engine::StateManager::new();
    let storage = FsStorage;
    let sink = CliSink::new();
    let stop_flag = AtomicBool::new(false);

    match engine::run_transfer(
        &args.src,
        &args.dst,
        &config,
        &mut state,
        &storage,
        &sink,
        &stop_flag,
        env!("CARGO_PKG_VERSION"),
    ) {
        Ok(result) => {
            eprintln!();
            eprintln!(
                "Files transferred: {}/{}",
                result.successful_files, result.total_files
            );
            if let Some(log_path) = &result.log_path {
                eprintln!("Log: {}", log_path.display());
            }
            match result.outcome {
                TransferOutcome::Success | TransferOutcome::NoFiles => 0,
                TransferOutcome::PartialFailure => 1,
                TransferOutcome::Stopped => 130,
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            2
        }
    }
}
