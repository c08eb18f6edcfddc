use crate::report::PublishFailures;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid image reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Credential resolution failed for {registry}: {message}")]
    AuthResolutionFailed { registry: String, message: String },

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Pull failed for {image}: {message}")]
    PullFailed { image: String, message: String },

    #[error("Export to {path} failed: {source}")]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("{0}")]
    PublishFailed(#[from] PublishFailures),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::AuthResolutionFailed { registry, message } => {
                format!(
                    "レジストリ {} の認証情報を取得できませんでした: {}\n\
                     \n\
                     解決方法:\n\
                     1. --username / --password (または DEPLOYER_DOCKER_USERNAME / DEPLOYER_DOCKER_PASSWORD) を指定してください\n\
                     2. docker login {} を実行してください",
                    registry, message, registry
                )
            }
            BuildError::EngineUnavailable(msg) => {
                format!(
                    "Dockerに接続できませんでした: {}\n\
                     \n\
                     Dockerが起動しているか確認してください。",
                    msg
                )
            }
            BuildError::ExportFailed { path, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!(
                    "イメージを書き出す権限がありません: {}\n\
                     \n\
                     出力ディレクトリの権限を確認してください。",
                    path.display()
                )
            }
            _ => format!("{}", self),
        }
    }

    /// ローカルI/Oの権限エラーかどうか
    pub fn is_permission_denied(&self) -> bool {
        match self {
            BuildError::ExportFailed { source, .. } | BuildError::Io(source) => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
pub type BuildResult<T> = Result<T>;
