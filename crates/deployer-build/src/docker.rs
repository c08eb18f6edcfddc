//! Docker Engine API を使ったビルドエンジン実装

use crate::auth::Credentials;
use crate::context::ContextBuilder;
use crate::engine::{BuildRequest, ContainerEngine, ImageHandle};
use crate::error::{BuildError, BuildResult};
use crate::reference::ImageReference;
use crate::tags::TargetReference;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::PushImageInfo;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Docker デーモンへの接続
///
/// 呼び出し側が所有し、コマンドの終了とともに破棄する。
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// ローカルのDockerに接続し、疎通を確認する
    pub async fn connect() -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BuildError::EngineUnavailable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| BuildError::EngineUnavailable(e.to_string()))?;

        tracing::debug!("Connected to Docker");
        Ok(Self { docker })
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// ビルド出力の処理
    fn handle_build_output(&self, output: bollard::models::BuildInfo) -> BuildResult<()> {
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!(target: "deployer::engine", "{}", line);
            }
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            tracing::debug!(target: "deployer::engine", "{}", status);
        }

        Ok(())
    }

    /// プッシュ進捗の処理。ダイジェストが含まれていれば返す
    fn handle_push_progress(&self, info: &PushImageInfo) -> Option<String> {
        let status = info.status.as_deref()?;
        match status {
            "Preparing" | "Waiting" => None,
            _ => {
                let progress = info.progress.as_deref().unwrap_or("");
                tracing::debug!(target: "deployer::engine", "{} {}", status, progress);
                parse_digest(status).map(str::to_string)
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull(
        &self,
        reference: &ImageReference,
        credentials: Option<&Credentials>,
    ) -> BuildResult<()> {
        let (from_image, tag) = match reference.digest() {
            Some(_) => (reference.to_string(), String::new()),
            None => (
                reference.name().to_string(),
                reference.tag().unwrap_or("latest").to_string(),
            ),
        };

        tracing::info!(image = %reference, "Pulling image");

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: from_image.as_str(),
            tag: tag.as_str(),
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(
            Some(options),
            None,
            credentials.map(Credentials::to_docker_credentials),
        );

        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    ..
                }) => {
                    tracing::debug!(target: "deployer::engine", "{}", status);
                }
                Err(e) => {
                    return Err(BuildError::PullFailed {
                        image: reference.to_string(),
                        message: e.to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> BuildResult<ImageHandle> {
        tracing::info!("Building image: {}", request.tag);

        let context_data = ContextBuilder::create_context(&request.context, &request.dockerfile)?;

        let labels: HashMap<&str, &str> = request.labels.iter().collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: request.tag.as_str(),
            labels,
            target: request.target.as_deref().unwrap_or(""),
            platform: request.platform.as_deref().unwrap_or(""),
            nocache: request.no_cache,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };

        tracing::debug!("Build options: {:?}", options);

        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            self.handle_build_output(msg?)?;
        }

        let id = self.docker.inspect_image(&request.tag).await?.id;

        tracing::info!("Successfully built: {}", request.tag);
        Ok(ImageHandle {
            name: request.tag.clone(),
            id,
        })
    }

    async fn export(&self, image: &ImageHandle, path: &Path) -> BuildResult<()> {
        let export_failed = |source| BuildError::ExportFailed {
            path: path.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(path).await.map_err(export_failed)?;
        let mut stream = self.docker.export_image(&image.name);

        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await.map_err(export_failed)?;
        }
        file.flush().await.map_err(export_failed)?;

        Ok(())
    }

    async fn publish(
        &self,
        image: &ImageHandle,
        target: &TargetReference,
        credentials: &Credentials,
    ) -> BuildResult<String> {
        #[allow(deprecated)]
        let tag_options = bollard::image::TagImageOptions {
            repo: target.name(),
            tag: target.tag(),
        };
        self.docker
            .tag_image(&image.name, Some(tag_options))
            .await
            .map_err(|e| BuildError::PushFailed {
                message: format!("failed to tag {} as {}: {}", image.name, target, e),
            })?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: target.tag().to_string(),
        };

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(
            target.name(),
            Some(options),
            Some(credentials.to_docker_credentials()),
        );

        let mut digest: Option<String> = None;
        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error.clone() {
                        error_message = Some(err);
                    } else if let Some(d) = self.handle_push_progress(&info) {
                        digest = Some(d);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        Ok(match digest {
            Some(digest) => format!("{}@{}", target, digest),
            None => target.to_string(),
        })
    }
}

/// プッシュ完了ステータスからダイジェストを取り出す
///
/// 例: `v1: digest: sha256:abc… size: 1570` -> `sha256:abc…`
fn parse_digest(status: &str) -> Option<&str> {
    let (_, rest) = status.split_once("digest: ")?;
    rest.split_whitespace().next().filter(|d| d.contains(':'))
}
