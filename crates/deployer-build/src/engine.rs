//! コンテナビルドエンジンの抽象化
//!
//! ビルド・エクスポート・公開といったエンジン側の操作をトレイトとして定義します。
//! 実装は [`crate::docker::DockerEngine`] と、テスト用のモックです。

use crate::auth::Credentials;
use crate::error::{BuildError, BuildResult};
use crate::labels::LabelSet;
use crate::reference::ImageReference;
use crate::tags::TargetReference;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// エンジン上でビルドされたイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// ローカルのイメージ名 (`base:unique_tag`)
    pub name: String,
    /// エンジンが返したイメージID
    pub id: Option<String>,
}

impl ImageHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }
}

/// ビルド要求
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// ビルドコンテキストのディレクトリ
    pub context: PathBuf,
    /// Dockerfile のパス
    pub dockerfile: PathBuf,
    /// ローカルで付けるイメージ名
    pub tag: String,
    pub labels: LabelSet,
    /// マルチステージビルドのターゲット
    pub target: Option<String>,
    pub platform: Option<String>,
    pub no_cache: bool,
}

impl BuildRequest {
    pub fn new(
        context: impl Into<PathBuf>,
        dockerfile: impl Into<PathBuf>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            dockerfile: dockerfile.into(),
            tag: tag.into(),
            labels: LabelSet::new(),
            target: None,
            platform: None,
            no_cache: false,
        }
    }

    /// コンテキストと Dockerfile の存在を確認
    pub fn validate(&self) -> BuildResult<()> {
        if !self.context.is_dir() {
            return Err(BuildError::ContextNotFound(self.context.clone()));
        }
        if !self.dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(self.dockerfile.clone()));
        }
        Ok(())
    }
}

/// コンテナビルドエンジン
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// ベースイメージを取得
    async fn pull(
        &self,
        reference: &ImageReference,
        credentials: Option<&Credentials>,
    ) -> BuildResult<()>;

    /// イメージをビルド
    async fn build(&self, request: &BuildRequest) -> BuildResult<ImageHandle>;

    /// イメージを tar としてローカルに書き出す
    async fn export(&self, image: &ImageHandle, path: &Path) -> BuildResult<()>;

    /// イメージを1つの公開先へプッシュし、公開されたアドレスを返す
    async fn publish(
        &self,
        image: &ImageHandle,
        target: &TargetReference,
        credentials: &Credentials,
    ) -> BuildResult<String>;
}

/// 親ディレクトリを作成してからイメージを書き出す
///
/// 同じディレクトリの一時ファイルへ書き出し、完了後にリネームします。
/// 失敗やキャンセルで future が破棄された場合、一時ファイルは削除され、
/// `path` には書きかけのファイルが残りません。
pub async fn export_artifact<E>(engine: &E, image: &ImageHandle, path: &Path) -> BuildResult<()>
where
    E: ContainerEngine + ?Sized,
{
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    let export_failed = |source| BuildError::ExportFailed {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|source| BuildError::ExportFailed {
            path: parent.clone(),
            source,
        })?;

    let partial = tempfile::Builder::new()
        .prefix(".deployer-")
        .suffix(".partial")
        .tempfile_in(&parent)
        .map_err(export_failed)?;

    tracing::info!(image = %image.name, path = %path.display(), "Exporting image");
    engine.export(image, partial.path()).await?;

    partial.persist(path).map_err(|e| export_failed(e.error))?;
    tracing::debug!(path = %path.display(), "Artifact written");
    Ok(())
}
