use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// ログ出力を初期化
///
/// 実行ごとに `<logs_dir>/deployer-<timestamp>.log` を作成し、`--verbose` のときは
/// stderr にも同じ内容を出す。ログファイルを開けない場合は stderr のみに出力する。
pub fn init(logs_dir: &Path, verbose: bool) -> Option<PathBuf> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match open_log_file(logs_dir) {
        Ok((path, file)) => {
            let file = Arc::new(file);
            if verbose {
                tracing_subscriber::fmt()
                    .with_writer(file.and(std::io::stderr))
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_writer(file)
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .init();
            }
            Some(path)
        }
        Err(e) => {
            let filter = if verbose { filter } else { EnvFilter::new("warn") };
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            tracing::warn!("Failed to open log file in {}: {}", logs_dir.display(), e);
            None
        }
    }
}

fn open_log_file(logs_dir: &Path) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(logs_dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let path = logs_dir.join(format!("deployer-{}.log", timestamp));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}
