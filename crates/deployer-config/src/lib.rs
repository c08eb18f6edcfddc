pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// プロジェクトごとの作業ディレクトリ
pub const STATE_DIR: &str = ".deployer";
/// 設定ファイル名
pub const CONFIG_FILE: &str = "config.yaml";

/// 公開用の認証情報（push）
pub const ENV_PUSH_USERNAME: &str = "DEPLOYER_DOCKER_USERNAME";
pub const ENV_PUSH_PASSWORD: &str = "DEPLOYER_DOCKER_PASSWORD";
/// ベースイメージ取得用の認証情報（pull）
pub const ENV_PULL_USERNAME: &str = "DEPLOYER_PULL_USERNAME";
pub const ENV_PULL_PASSWORD: &str = "DEPLOYER_PULL_PASSWORD";
/// ビルド固有の識別子
pub const ENV_BUILD_ID: &str = "DEPLOYER_BUILD_ID";
/// アーティファクトの出力先
pub const ENV_ARTIFACTS_DIR: &str = "DEPLOYER_ARTIFACTS_DIR";

/// config.yaml の内容（すべて省略可能）
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// イメージ tar の出力先
    pub artifacts_dir: Option<PathBuf>,
    /// ログファイルの出力先
    pub logs_dir: Option<PathBuf>,
    /// Docker config.json を含むディレクトリ
    pub docker_config: Option<PathBuf>,
}

impl ConfigFile {
    /// 設定ファイルを読み込む。存在しない場合は `None`
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }

        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// 相対パスを基準ディレクトリからのパスに解決
    fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve =
            |p: Option<PathBuf>| p.map(|p| if p.is_relative() { base.join(p) } else { p });
        self.artifacts_dir = resolve(self.artifacts_dir);
        self.logs_dir = resolve(self.logs_dir);
        self.docker_config = resolve(self.docker_config);
        self
    }

    /// `other` で指定された項目を優先してマージ
    fn merge(self, other: ConfigFile) -> Self {
        Self {
            artifacts_dir: other.artifacts_dir.or(self.artifacts_dir),
            logs_dir: other.logs_dir.or(self.logs_dir),
            docker_config: other.docker_config.or(self.docker_config),
        }
    }
}

/// グローバル設定ファイルのパス (~/.config/deployer/config.yaml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("deployer").join(CONFIG_FILE))
}

/// 実行時の設定
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    root: PathBuf,
    artifacts_dir: PathBuf,
    logs_dir: PathBuf,
    docker_config: Option<PathBuf>,
}

impl DeployerConfig {
    /// 設定を読み込む
    ///
    /// 以下の優先順位で値を決定:
    /// 1. 環境変数 DEPLOYER_ARTIFACTS_DIR（アーティファクトの出力先のみ）
    /// 2. <root>/.deployer/config.yaml
    /// 3. ~/.config/deployer/config.yaml
    /// 4. デフォルト (<root>/.deployer/artifacts/images, <root>/.deployer/logs)
    pub fn load(root: &Path) -> Result<Self> {
        let mut file = ConfigFile::default();

        if let Some(global) = global_config_path()
            && let Some(loaded) = ConfigFile::load(&global)?
        {
            tracing::debug!("Loaded global config: {}", global.display());
            let base = global.parent().unwrap_or(root).to_path_buf();
            file = file.merge(loaded.resolve_paths(&base));
        }

        let project = root.join(STATE_DIR).join(CONFIG_FILE);
        if let Some(loaded) = ConfigFile::load(&project)? {
            tracing::debug!("Loaded project config: {}", project.display());
            file = file.merge(loaded.resolve_paths(root));
        }

        if let Ok(dir) = std::env::var(ENV_ARTIFACTS_DIR)
            && !dir.is_empty()
        {
            let dir = PathBuf::from(dir);
            file.artifacts_dir = Some(if dir.is_relative() { root.join(dir) } else { dir });
        }

        Ok(Self::from_file(root, file))
    }

    fn from_file(root: &Path, file: ConfigFile) -> Self {
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.to_path_buf(),
            artifacts_dir: file
                .artifacts_dir
                .unwrap_or_else(|| state_dir.join("artifacts").join("images")),
            logs_dir: file.logs_dir.unwrap_or_else(|| state_dir.join("logs")),
            docker_config: file.docker_config,
        }
    }

    /// CLI で指定された出力先で上書き
    pub fn with_artifacts_dir(mut self, dir: PathBuf) -> Self {
        self.artifacts_dir = if dir.is_relative() {
            self.root.join(dir)
        } else {
            dir
        };
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// credential store として使う Docker 設定ディレクトリ（未指定なら既定の場所）
    pub fn docker_config(&self) -> Option<&Path> {
        self.docker_config.as_deref()
    }

    /// イメージ名から決まるアーティファクトのパス
    ///
    /// 例: `registry.example/app` -> `<artifacts>/registry.example_app.tar`
    pub fn artifact_path(&self, image_name: &str) -> Result<PathBuf> {
        let name = sanitize_image_name(image_name)?;
        Ok(self.artifacts_dir.join(format!("{}.tar", name)))
    }
}

/// ファイル名に使えない文字を `_` に置き換える
pub fn sanitize_image_name(image_name: &str) -> Result<String> {
    let sanitized: String = image_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return Err(ConfigError::InvalidArtifactName(image_name.to_string()));
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn isolated<R>(f: impl FnOnce() -> R) -> R {
        let empty = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(empty.path().as_os_str().to_owned())),
                (ENV_ARTIFACTS_DIR, None),
            ],
            f,
        )
    }

    #[test]
    fn test_sanitize_image_name() {
        assert_eq!(
            sanitize_image_name("registry.example/app").unwrap(),
            "registry.example_app"
        );
        assert_eq!(
            sanitize_image_name("localhost:5000/team/app").unwrap(),
            "localhost_5000_team_app"
        );
        assert!(sanitize_image_name("").is_err());
        assert!(sanitize_image_name("..").is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let root = tempfile::tempdir().unwrap();
        let config = isolated(|| DeployerConfig::load(root.path()).unwrap());

        assert_eq!(
            config.artifacts_dir(),
            root.path().join(".deployer/artifacts/images")
        );
        assert_eq!(config.logs_dir(), root.path().join(".deployer/logs"));
        assert!(config.docker_config().is_none());
        assert_eq!(
            config.artifact_path("ghcr.io/org/app").unwrap(),
            root.path().join(".deployer/artifacts/images/ghcr.io_org_app.tar")
        );
    }

    #[test]
    #[serial]
    fn test_project_config_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(STATE_DIR)).unwrap();
        fs::write(
            root.path().join(STATE_DIR).join(CONFIG_FILE),
            "artifacts_dir: out/images\ndocker_config: /etc/deployer/docker\n",
        )
        .unwrap();

        let config = isolated(|| DeployerConfig::load(root.path()).unwrap());
        assert_eq!(config.artifacts_dir(), root.path().join("out/images"));
        assert_eq!(
            config.docker_config(),
            Some(Path::new("/etc/deployer/docker"))
        );
        assert_eq!(config.logs_dir(), root.path().join(".deployer/logs"));
    }

    #[test]
    #[serial]
    fn test_project_overrides_global() {
        let root = tempfile::tempdir().unwrap();
        let xdg = tempfile::tempdir().unwrap();
        fs::create_dir_all(xdg.path().join("deployer")).unwrap();
        fs::write(
            xdg.path().join("deployer").join(CONFIG_FILE),
            "artifacts_dir: /global/images\nlogs_dir: /global/logs\n",
        )
        .unwrap();
        fs::create_dir_all(root.path().join(STATE_DIR)).unwrap();
        fs::write(
            root.path().join(STATE_DIR).join(CONFIG_FILE),
            "artifacts_dir: /project/images\n",
        )
        .unwrap();

        let config = temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(xdg.path().as_os_str().to_owned())),
                (ENV_ARTIFACTS_DIR, None),
            ],
            || DeployerConfig::load(root.path()).unwrap(),
        );
        assert_eq!(config.artifacts_dir(), Path::new("/project/images"));
        assert_eq!(config.logs_dir(), Path::new("/global/logs"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(STATE_DIR)).unwrap();
        fs::write(
            root.path().join(STATE_DIR).join(CONFIG_FILE),
            "artifacts_dir: from-file\n",
        )
        .unwrap();

        let empty = tempfile::tempdir().unwrap();
        let config = temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(empty.path().as_os_str().to_owned())),
                (ENV_ARTIFACTS_DIR, Some("from-env".into())),
            ],
            || DeployerConfig::load(root.path()).unwrap(),
        );
        assert_eq!(config.artifacts_dir(), root.path().join("from-env"));

        let config = config.with_artifacts_dir(PathBuf::from("/from/cli"));
        assert_eq!(config.artifacts_dir(), Path::new("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_invalid_config_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(STATE_DIR)).unwrap();
        fs::write(
            root.path().join(STATE_DIR).join(CONFIG_FILE),
            "artifacts_dir: [unclosed\n",
        )
        .unwrap();

        let result = isolated(|| DeployerConfig::load(root.path()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_empty_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "\n").unwrap();

        let file = ConfigFile::load(&path).unwrap().unwrap();
        assert!(file.artifacts_dir.is_none());
        assert!(ConfigFile::load(&dir.path().join("missing.yaml")).unwrap().is_none());
    }
}
