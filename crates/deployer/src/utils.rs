use colored::Colorize;
use deployer_build::{BuildError, PublishReport, TargetReference};

/// 公開先の一覧を表示
pub fn print_targets(targets: &[TargetReference]) {
    println!("{}", format!("公開先 ({} 個):", targets.len()).bold());
    for target in targets {
        println!("  • {}", target.to_string().cyan());
    }
}

/// 無視したラベルを表示
pub fn print_rejected_labels(rejected: &[String]) {
    for entry in rejected {
        eprintln!(
            "  {} ラベルの形式が不正なため無視しました (key=value): {}",
            "⚠".yellow(),
            entry
        );
    }
}

/// 公開結果を表示
///
/// 失敗したタグの詳細は、呼び出し側が返すエラーとして表示される。
pub fn print_report(report: &PublishReport) {
    for published in report.succeeded() {
        println!("  {} Published image: {}", "✓".green(), published.address.cyan());
    }

    println!();
    if report.is_success() {
        println!(
            "{}",
            format!("✓ {} 個のタグを公開しました", report.succeeded().len())
                .green()
                .bold()
        );
    } else {
        eprintln!(
            "{}",
            format!(
                "✗ {} 個中 {} 個のタグの公開に失敗しました",
                report.attempted(),
                report.failed().len()
            )
            .red()
            .bold()
        );
    }
}

/// エラーを表示
pub fn print_error(error: &anyhow::Error) {
    let message = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BuildError>())
        .map(BuildError::user_message)
        .unwrap_or_else(|| format!("{:#}", error));

    eprintln!();
    eprintln!("{} {}", "Error:".red().bold(), message);
}
