mod build;
mod logging;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use deployer_build::{ExitStatus, cancel_pair};
use deployer_config::DeployerConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "一度ビルドして、すべてのタグへ。", long_about = None)]
struct Cli {
    /// 詳細なログを stderr にも出力
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 作業ディレクトリ（省略時はカレントディレクトリ）
    #[arg(long, global = true, value_name = "DIR")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルドし、tar として書き出して、必要ならすべてのタグへ公開
    Build(build::BuildArgs),
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("deployer {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let root = match cli.cwd {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("{} 作業ディレクトリを取得できません: {}", "Error:".red().bold(), e);
                return ExitStatus::CantCreate.into();
            }
        },
    };

    let config = match DeployerConfig::load(&root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitStatus::Config.into();
        }
    };

    if let Some(path) = logging::init(config.logs_dir(), cli.verbose) {
        tracing::debug!("Logging to {}", path.display());
    }

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            eprintln!("{}", "中断しています...".yellow());
            cancel_handle.cancel();
        }
    });

    let status = match cli.command {
        Commands::Build(args) => match build::handle_build_command(config, args, cancel).await {
            Ok(()) => ExitStatus::Success,
            Err(e) => {
                tracing::error!("{:#}", e);
                utils::print_error(&e);
                ExitStatus::from_error(&e)
            }
        },
        Commands::Version => ExitStatus::Success,
    };

    if !status.is_success() {
        tracing::info!(code = status.code(), "Exiting with failure status");
        eprintln!("sysexits(3) error code {}", status.code());
    }
    status.into()
}
