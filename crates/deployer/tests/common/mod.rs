use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
    /// 空の Docker 設定ディレクトリ（認証情報なし）
    pub docker_config: TempDir,
    /// 空の XDG 設定ディレクトリ（グローバル設定なし）
    pub xdg_config: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            docker_config: tempfile::tempdir().unwrap(),
            xdg_config: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_dockerfile(&self, content: &str) {
        fs::write(self.root.path().join("Dockerfile"), content).unwrap();
    }

    pub fn write_docker_config(&self, content: &str) {
        fs::write(self.docker_config.path().join("config.json"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// 環境から切り離した deployer コマンド
    #[allow(deprecated)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("deployer").unwrap();
        cmd.current_dir(self.root.path())
            .env("DOCKER_CONFIG", self.docker_config.path())
            .env("XDG_CONFIG_HOME", self.xdg_config.path())
            .env_remove("DEPLOYER_DOCKER_USERNAME")
            .env_remove("DEPLOYER_DOCKER_PASSWORD")
            .env_remove("DEPLOYER_PULL_USERNAME")
            .env_remove("DEPLOYER_PULL_PASSWORD")
            .env_remove("DEPLOYER_BUILD_ID")
            .env_remove("DEPLOYER_ARTIFACTS_DIR")
            .env("DOCKER_HOST", unreachable_docker_host(self.root.path()));
        cmd
    }
}

/// 接続できない Docker ソケット
fn unreachable_docker_host(root: &Path) -> String {
    format!("unix://{}", root.join("no-docker.sock").display())
}
