//! 公開先タグの組み立て
//!
//! ベースイメージ名と要求されたタグ、ビルド固有の識別子から
//! 重複のない公開先参照の一覧を作ります。

use crate::error::{BuildError, BuildResult};
use crate::reference::{ImageReference, split_tag};
use std::collections::HashSet;
use std::fmt;

/// 1つの公開先 (`name:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetReference {
    name: String,
    tag: String,
}

impl TargetReference {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// レジストリ込みのリポジトリ名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// レジストリホストを得るためにイメージ参照としてパース
    pub fn to_image_reference(&self) -> BuildResult<ImageReference> {
        ImageReference::parse(&self.to_string())
    }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// 1回の実行で公開するイメージの指定
#[derive(Debug, Clone)]
pub struct ImageSpec {
    base_name: String,
    unique_tag: String,
    tags: Vec<String>,
}

impl ImageSpec {
    pub fn new(
        base_name: impl Into<String>,
        unique_tag: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            unique_tag: unique_tag.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn unique_tag(&self) -> &str {
        &self.unique_tag
    }

    /// ローカルでビルドするイメージの名前 (`base:unique_tag`)
    pub fn local_name(&self) -> String {
        TargetReference::new(&self.base_name, &self.unique_tag).to_string()
    }

    /// 公開先の一覧
    pub fn targets(&self) -> Vec<TargetReference> {
        build_targets(&self.base_name, &self.tags, &self.unique_tag)
    }

    /// すべてのタグを検証
    pub fn validate(&self) -> BuildResult<()> {
        validate_tag(&self.unique_tag)?;
        self.tags.iter().try_for_each(|tag| validate_tag(tag))
    }
}

/// 公開先の参照を組み立てる
///
/// 識別子が要求タグに含まれていなければ末尾に追加し、
/// 完全一致で重複を除きつつ最初に現れた順序を保つ。
pub fn build_targets(
    base_name: &str,
    requested_tags: &[String],
    unique_identifier: &str,
) -> Vec<TargetReference> {
    let mut seen = HashSet::new();

    requested_tags
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(unique_identifier))
        .filter(|tag| seen.insert(*tag))
        .map(|tag| TargetReference::new(base_name, tag))
        .collect()
}

/// タグのバリデーション
///
/// Docker タグの制約:
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}

/// イメージ名とタグを分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    let (name, tag) = split_tag(image);
    (name.to_string(), tag.unwrap_or("latest").to_string())
}
