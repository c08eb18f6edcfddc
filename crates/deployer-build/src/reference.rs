//! イメージ参照のパース
//!
//! `[registry/]repository[:tag][@digest]` 形式の文字列を分解し、
//! 認証情報の解決に使うレジストリホストを取り出します。

use crate::error::{BuildError, BuildResult};
use crate::tags::validate_tag;
use std::fmt;

/// Docker Hub のレジストリホスト
pub const DOCKER_HUB: &str = "docker.io";

/// パース済みのイメージ参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: String,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// イメージ参照をパース
    ///
    /// # Examples
    /// - `ghcr.io/org/app:v1.0` -> registry `ghcr.io`, name `ghcr.io/org/app`, tag `v1.0`
    /// - `myuser/app` -> registry `docker.io`, name `myuser/app`
    /// - `localhost:5000/app:dev` -> registry `localhost:5000`, tag `dev`
    pub fn parse(input: &str) -> BuildResult<Self> {
        let invalid = |message: &str| BuildError::InvalidReference {
            reference: input.to_string(),
            message: message.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
            Some(_) => return Err(invalid("empty digest")),
            None => (input, None),
        };

        let (name, tag) = split_tag(rest);
        if let Some(tag) = tag {
            validate_tag(tag)?;
        }

        let components: Vec<&str> = name.split('/').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(invalid("empty path component"));
        }

        let (registry, repository_path) = match components.as_slice() {
            [first, _, ..] if is_registry_host(first) => {
                (first.to_string(), &name[first.len() + 1..])
            }
            _ => (DOCKER_HUB.to_string(), name),
        };
        if let Some(c) = repository_path
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(*c)))
        {
            return Err(invalid(&format!(
                "invalid character '{}' in repository path",
                c
            )));
        }

        Ok(Self {
            registry,
            name: name.to_string(),
            tag: tag.map(str::to_string),
            digest,
        })
    }

    /// レジストリホスト（例: `ghcr.io`, `localhost:5000`, `docker.io`）
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// タグ・ダイジェストを除いたイメージ名（レジストリ込み、入力どおり）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// レジストリの判定: `.` か `:` を含む、または `localhost`
fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// 末尾のタグを分離する。レジストリのポート番号はタグとして扱わない
pub(crate) fn split_tag(image: &str) -> (&str, Option<&str>) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        if !potential_tag.contains('/') {
            return (&image[..pos], Some(potential_tag));
        }
    }
    (image, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ghcr() {
        let reference = ImageReference::parse("ghcr.io/org/app:v1.0").unwrap();
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.name(), "ghcr.io/org/app");
        assert_eq!(reference.tag(), Some("v1.0"));
        assert_eq!(reference.to_string(), "ghcr.io/org/app:v1.0");
    }

    #[test]
    fn test_parse_docker_hub() {
        let reference = ImageReference::parse("myuser/app").unwrap();
        assert_eq!(reference.registry(), "docker.io");
        assert_eq!(reference.name(), "myuser/app");
        assert_eq!(reference.tag(), None);

        let reference = ImageReference::parse("nginx:alpine").unwrap();
        assert_eq!(reference.registry(), "docker.io");
        assert_eq!(reference.tag(), Some("alpine"));
    }

    #[test]
    fn test_parse_localhost_with_port() {
        let reference = ImageReference::parse("localhost:5000/myapp").unwrap();
        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.tag(), None);

        let reference = ImageReference::parse("localhost:5000/myapp:dev").unwrap();
        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.name(), "localhost:5000/myapp");
        assert_eq!(reference.tag(), Some("dev"));
    }

    #[test]
    fn test_parse_ecr() {
        let reference =
            ImageReference::parse("123456789.dkr.ecr.ap-northeast-1.amazonaws.com/app").unwrap();
        assert_eq!(
            reference.registry(),
            "123456789.dkr.ecr.ap-northeast-1.amazonaws.com"
        );
    }

    #[test]
    fn test_parse_digest() {
        let reference = ImageReference::parse("registry.example/app@sha256:abc").unwrap();
        assert_eq!(reference.registry(), "registry.example");
        assert_eq!(reference.digest(), Some("sha256:abc"));
        assert_eq!(reference.tag(), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "app name", "registry.example//app", "Registry.example/App", "app@"] {
            let result = ImageReference::parse(input);
            assert!(
                matches!(result, Err(BuildError::InvalidReference { .. })),
                "expected InvalidReference for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_tag() {
        let result = ImageReference::parse("registry.example/app:-bad");
        assert!(matches!(result, Err(BuildError::InvalidTag { .. })));
    }
}
