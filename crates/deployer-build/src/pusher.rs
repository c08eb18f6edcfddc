//! 複数タグへのイメージ公開
//!
//! 公開先ごとに認証情報を解決してプッシュし、1つのタグの失敗が
//! 他のタグの公開を止めないように結果を集約します。

use crate::auth::{CredentialCache, CredentialProvider};
use crate::cancel::CancelSignal;
use crate::engine::{ContainerEngine, ImageHandle};
use crate::error::{BuildError, BuildResult};
use crate::report::PublishReport;
use crate::tags::TargetReference;

/// イメージ公開を実行するハンドラ
///
/// エンジンは呼び出し側が所有し、参照で受け取る。
pub struct ImagePusher<'a, E: ?Sized, P> {
    engine: &'a E,
    credentials: CredentialCache<P>,
    cancel: CancelSignal,
}

impl<'a, E, P> ImagePusher<'a, E, P>
where
    E: ContainerEngine + ?Sized,
    P: CredentialProvider,
{
    pub fn new(engine: &'a E, provider: P) -> Self {
        Self {
            engine,
            credentials: CredentialCache::new(provider),
            cancel: CancelSignal::never(),
        }
    }

    /// 解決済みの認証情報キャッシュを引き継いで作成
    pub fn from_cache(engine: &'a E, credentials: CredentialCache<P>) -> Self {
        Self {
            engine,
            credentials,
            cancel: CancelSignal::never(),
        }
    }

    /// キャンセル通知を設定
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// すべての公開先ホストの認証情報を事前に解決
    ///
    /// 1つでも解決できなければ、どのタグも公開せずにエラーを返す。
    pub fn prepare(&mut self, targets: &[TargetReference]) -> BuildResult<()> {
        self.credentials.prepare(targets)
    }

    /// 各公開先へ順番にプッシュし、結果を集約する
    ///
    /// 認証情報の解決に失敗した場合のみ `Err` を返す。個々のタグの失敗は
    /// レポートに記録され、残りのタグの公開は続行される。
    pub async fn publish(
        &mut self,
        image: &ImageHandle,
        targets: &[TargetReference],
    ) -> BuildResult<PublishReport> {
        self.prepare(targets)?;

        let mut report = PublishReport::new();
        for target in targets {
            let outcome = self.publish_one(image, target).await;

            match &outcome {
                Ok(address) => tracing::info!(
                    reference = %target,
                    outcome = "published",
                    address = %address,
                    "publish attempt"
                ),
                Err(BuildError::Cancelled) => tracing::warn!(
                    reference = %target,
                    outcome = "cancelled",
                    "publish attempt"
                ),
                Err(e) => tracing::error!(
                    reference = %target,
                    outcome = "failed",
                    error = %e,
                    "publish attempt"
                ),
            }

            report.record(target.clone(), outcome);
        }

        Ok(report)
    }

    async fn publish_one(
        &mut self,
        image: &ImageHandle,
        target: &TargetReference,
    ) -> BuildResult<String> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let reference = target.to_image_reference()?;
        let credentials = self.credentials.get_or_resolve(&reference)?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BuildError::Cancelled),
            result = self.engine.publish(image, target, credentials) => result,
        }
    }
}
