//! 公開結果の集計

use crate::error::{BuildError, BuildResult};
use crate::tags::TargetReference;
use std::fmt;

/// 公開に成功したタグ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub target: TargetReference,
    /// レジストリ上のアドレス（ダイジェストが分かれば `name:tag@sha256:…`）
    pub address: String,
}

/// 公開に失敗したタグ
#[derive(Debug)]
pub struct FailedPublish {
    pub target: TargetReference,
    pub error: BuildError,
}

/// 1回の公開処理の結果（タグの投入順）
#[derive(Debug, Default)]
pub struct PublishReport {
    succeeded: Vec<PublishedImage>,
    failed: Vec<FailedPublish>,
}

impl PublishReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1つのタグの結果を記録
    pub fn record(&mut self, target: TargetReference, outcome: Result<String, BuildError>) {
        match outcome {
            Ok(address) => self.succeeded.push(PublishedImage { target, address }),
            Err(error) => self.failed.push(FailedPublish { target, error }),
        }
    }

    pub fn succeeded(&self) -> &[PublishedImage] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[FailedPublish] {
        &self.failed
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// 成功したタグと、失敗をまとめたものに分ける
    pub fn into_parts(self) -> (Vec<PublishedImage>, PublishFailures) {
        (
            self.succeeded,
            PublishFailures {
                failures: self.failed,
            },
        )
    }

    /// すべて成功していれば公開済みのタグを返し、1つでも失敗があれば
    /// [`BuildError::PublishFailed`] にまとめる
    pub fn into_result(self) -> BuildResult<Vec<PublishedImage>> {
        let (succeeded, failures) = self.into_parts();
        failures.into_result()?;
        Ok(succeeded)
    }
}

/// 複数タグの公開失敗をまとめたエラー
#[derive(Debug, Default)]
pub struct PublishFailures {
    failures: Vec<FailedPublish>,
}

impl PublishFailures {
    pub fn failures(&self) -> &[FailedPublish] {
        &self.failures
    }

    /// 失敗が1つもない場合のみ `Ok`
    pub fn into_result(self) -> Result<(), PublishFailures> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for PublishFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tag(s) failed to publish:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  * {}: {}", failure.target, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishFailures {}
