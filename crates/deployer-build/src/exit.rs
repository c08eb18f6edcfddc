//! プロセス終了コードの決定
//!
//! 実行結果を sysexits(3) の分類に対応づけます。スクリプトやパイプラインは
//! メッセージを解析せずに終了コードで分岐できます。

use crate::error::BuildError;

/// 終了コードの分類（重大度の昇順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitStatus {
    Success,
    /// 分類できない失敗
    Failure,
    /// 1つ以上のタグの公開に失敗
    Software,
    /// キャンセルされた
    TempFail,
    /// 入力が不正
    Usage,
    /// ローカルファイルを作成できない
    CantCreate,
    /// ローカルファイルを書き込む権限がない
    NoPerm,
    /// ビルドエンジンに接続できない
    Unavailable,
    /// 認証情報・設定が利用できない
    Config,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Usage => 64,
            ExitStatus::Unavailable => 69,
            ExitStatus::Software => 70,
            ExitStatus::CantCreate => 73,
            ExitStatus::TempFail => 75,
            ExitStatus::NoPerm => 77,
            ExitStatus::Config => 78,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }

    /// ビルドエラーから終了コードを決定
    pub fn from_build_error(error: &BuildError) -> Self {
        match error {
            BuildError::InvalidReference { .. }
            | BuildError::InvalidTag { .. }
            | BuildError::ContextNotFound(_)
            | BuildError::DockerfileNotFound(_) => ExitStatus::Usage,
            BuildError::InvalidCredentials(_) | BuildError::AuthResolutionFailed { .. } => {
                ExitStatus::Config
            }
            BuildError::EngineUnavailable(_) => ExitStatus::Unavailable,
            e if e.is_permission_denied() => ExitStatus::NoPerm,
            BuildError::ExportFailed { .. } | BuildError::Io(_) => ExitStatus::CantCreate,
            // タグ単位の失敗は公開の失敗 (70)、キャンセルを含めば 75
            BuildError::PublishFailed(failures) => failures
                .failures()
                .iter()
                .map(|f| match f.error {
                    BuildError::Cancelled => ExitStatus::TempFail,
                    _ => ExitStatus::Software,
                })
                .fold(ExitStatus::Software, ExitStatus::worst),
            BuildError::Cancelled => ExitStatus::TempFail,
            BuildError::Docker(_)
            | BuildError::BuildFailed(_)
            | BuildError::PullFailed { .. }
            | BuildError::PushFailed { .. } => ExitStatus::Software,
        }
    }

    /// 任意のエラーから終了コードを決定
    ///
    /// 原因チェーンをたどって既知のエラーを探し、見つからなければ `Failure`。
    pub fn from_error(error: &anyhow::Error) -> Self {
        error
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<BuildError>() {
                    return Some(Self::from_build_error(e));
                }
                cause.downcast_ref::<std::io::Error>().map(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        ExitStatus::NoPerm
                    } else {
                        ExitStatus::CantCreate
                    }
                })
            })
            .unwrap_or(ExitStatus::Failure)
    }

    /// より重大な方を返す
    pub fn worst(self, other: ExitStatus) -> ExitStatus {
        self.max(other)
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::PublishReport;
    use crate::tags::TargetReference;
    use std::path::PathBuf;

    fn target(tag: &str) -> TargetReference {
        TargetReference::new("registry.example/app", tag)
    }

    fn publish_error(outcomes: Vec<(&str, Result<String, BuildError>)>) -> BuildError {
        let mut report = PublishReport::new();
        for (tag, outcome) in outcomes {
            report.record(target(tag), outcome);
        }
        report.into_result().unwrap_err()
    }

    #[test]
    fn test_publish_failure_mapping() {
        let err = publish_error(vec![
            ("v1", Ok("registry.example/app:v1".to_string())),
            (
                "v2",
                Err(BuildError::PushFailed {
                    message: "network unreachable".to_string(),
                }),
            ),
        ]);
        assert_eq!(ExitStatus::from_build_error(&err), ExitStatus::Software);
        assert_eq!(ExitStatus::from_build_error(&err).code(), 70);

        let err = anyhow::Error::new(err).context("publishing");
        assert_eq!(ExitStatus::from_error(&err).code(), 70);
    }

    #[test]
    fn test_cancelled_publish_mapping() {
        let err = publish_error(vec![
            (
                "v1",
                Err(BuildError::PushFailed {
                    message: "denied".to_string(),
                }),
            ),
            ("v2", Err(BuildError::Cancelled)),
        ]);
        assert_eq!(ExitStatus::from_build_error(&err), ExitStatus::TempFail);
        assert_eq!(ExitStatus::from_build_error(&err).code(), 75);
    }

    #[test]
    fn test_error_mapping() {
        let auth = BuildError::AuthResolutionFailed {
            registry: "registry.example".to_string(),
            message: "no credentials".to_string(),
        };
        assert_eq!(ExitStatus::from_build_error(&auth).code(), 78);

        let denied = BuildError::ExportFailed {
            path: PathBuf::from("/root/out.tar"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(ExitStatus::from_build_error(&denied).code(), 77);

        let io = BuildError::ExportFailed {
            path: PathBuf::from("/tmp/out.tar"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(ExitStatus::from_build_error(&io).code(), 73);

        let engine = BuildError::EngineUnavailable("socket missing".to_string());
        assert_eq!(ExitStatus::from_build_error(&engine).code(), 69);

        let tag = BuildError::InvalidTag {
            tag: "-x".to_string(),
        };
        assert_eq!(ExitStatus::from_build_error(&tag).code(), 64);
    }

    #[test]
    fn test_anyhow_mapping() {
        let err = anyhow::Error::new(BuildError::AuthResolutionFailed {
            registry: "ghcr.io".to_string(),
            message: "helper unavailable".to_string(),
        })
        .context("resolving push credentials");
        assert_eq!(ExitStatus::from_error(&err), ExitStatus::Config);

        let err = anyhow::anyhow!("something unexpected");
        assert_eq!(ExitStatus::from_error(&err), ExitStatus::Failure);
        assert_eq!(ExitStatus::from_error(&err).code(), 1);

        let err = anyhow::Error::new(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ));
        assert_eq!(ExitStatus::from_error(&err), ExitStatus::NoPerm);
    }

    #[test]
    fn test_worst() {
        assert_eq!(
            ExitStatus::Software.worst(ExitStatus::Config),
            ExitStatus::Config
        );
        assert_eq!(
            ExitStatus::Success.worst(ExitStatus::Software),
            ExitStatus::Software
        );
    }
}
