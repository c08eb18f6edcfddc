//! レジストリ認証処理
//!
//! 明示的に渡されたユーザー名/パスワード、または Docker config.json と
//! credential helper からレジストリごとの認証情報を解決します。

use crate::cancel::CancelSignal;
use crate::error::{BuildError, BuildResult};
use crate::reference::{DOCKER_HUB, ImageReference};
use crate::secret::SecretHandle;
use crate::tags::TargetReference;
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Docker Hub が config.json に記録される際の別名
const DOCKER_HUB_ALIASES: &[&str] = &[
    "https://index.docker.io/v1/",
    "index.docker.io",
    "registry-1.docker.io",
];

/// credential helper の終了を確認する間隔
const HELPER_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Docker config.json の構造
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    /// 認証情報 (レジストリ -> AuthEntry)
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
    /// レジストリごとの credential helper
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

/// 認証エントリ
#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

/// credential helper からのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// 1つのレジストリホストに対する認証情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    server_address: String,
    username: String,
    secret: SecretHandle,
}

impl Credentials {
    pub fn new(
        server_address: impl Into<String>,
        username: impl Into<String>,
        secret: SecretHandle,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            username: username.into(),
            secret,
        }
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretHandle {
        &self.secret
    }

    /// エンジンへの1回の認証呼び出し用に Bollard の形式へ変換
    pub(crate) fn to_docker_credentials(&self) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.secret.expose().to_string()),
            serveraddress: Some(self.server_address.clone()),
            ..Default::default()
        }
    }
}

/// イメージ参照から認証情報を得る手段
pub trait CredentialProvider {
    fn resolve(&self, reference: &ImageReference) -> BuildResult<Credentials>;
}

/// ローカルの credential store (Docker config.json + credential helper)
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
    cancel: CancelSignal,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// 新しい RegistryAuth を作成
    ///
    /// `DOCKER_CONFIG` が設定されていればそのディレクトリ、
    /// なければ ~/.docker/config.json を使用
    pub fn new() -> Self {
        let config_dir = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            });

        Self::with_config_dir(&config_dir)
    }

    /// config.json を含むディレクトリを指定
    pub fn with_config_dir(config_dir: &Path) -> Self {
        Self::with_config_path(config_dir.join("config.json"))
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            cancel: CancelSignal::never(),
        }
    }

    /// キャンセルされたら実行中の credential helper を停止する
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// レジストリホストの認証情報を探す
    ///
    /// # Returns
    /// * `Ok(Some(credentials))` - 認証情報が見つかった場合
    /// * `Ok(None)` - エントリが存在しない場合
    /// * `Err(e)` - config.json や credential helper が利用できない場合
    pub fn lookup(&self, registry: &str) -> BuildResult<Option<Credentials>> {
        if !self.config_path.exists() {
            tracing::debug!("Docker config.json not found at {:?}", self.config_path);
            return Ok(None);
        }

        let config = self.load_docker_config()?;
        let keys = lookup_keys(registry);

        // 1. レジストリ専用の credential helper
        if let Some(helper) = keys.iter().find_map(|k| config.cred_helpers.get(k)) {
            tracing::debug!("Using credential helper {} for {}", helper, registry);
            return self.get_from_helper(helper, registry);
        }

        // 2. auths セクション
        for key in &keys {
            if let Some(auth_entry) = config.auths.get(key)
                && let Some(auth_b64) = &auth_entry.auth
                && let Some(creds) = self.decode_auth(auth_b64, registry)?
            {
                tracing::debug!("Found credentials in auths for {}", registry);
                return Ok(Some(creds));
            }
        }

        // 3. デフォルトの credential store
        if let Some(helper) = &config.creds_store {
            tracing::debug!("Trying credential helper: {}", helper);
            return self.get_from_helper(helper, registry);
        }

        tracing::debug!("No credentials found for {}", registry);
        Ok(None)
    }

    /// Docker config.json を読み込み
    fn load_docker_config(&self) -> BuildResult<DockerConfig> {
        let content = std::fs::read_to_string(&self.config_path).map_err(|e| {
            BuildError::AuthResolutionFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            }
        })?;

        serde_json::from_str(&content).map_err(|e| BuildError::AuthResolutionFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }

    /// Base64エンコードされた認証情報をデコード
    fn decode_auth(&self, auth_b64: &str, registry: &str) -> BuildResult<Option<Credentials>> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth_b64)
            .map_err(|e| BuildError::AuthResolutionFailed {
                registry: registry.to_string(),
                message: format!("Failed to decode auth: {}", e),
            })?;

        let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthResolutionFailed {
            registry: registry.to_string(),
            message: format!("Invalid UTF-8 in auth: {}", e),
        })?;

        Ok(auth_str
            .split_once(':')
            .map(|(username, password)| {
                Credentials::new(registry, username, SecretHandle::new(password))
            }))
    }

    /// credential helper から認証情報を取得
    ///
    /// helper の終了を待つ間もキャンセルを監視し、キャンセルされたら
    /// プロセスを停止して `BuildError::Cancelled` を返す。
    fn get_from_helper(&self, helper: &str, registry: &str) -> BuildResult<Option<Credentials>> {
        let helper_cmd = format!("docker-credential-{}", helper);
        let helper_failed = |message: String| BuildError::AuthResolutionFailed {
            registry: registry.to_string(),
            message,
        };

        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let mut child = Command::new(&helper_cmd)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| helper_failed(format!("Failed to run {}: {}", helper_cmd, e)))?;

        // レジストリ名を stdin に渡し、閉じて EOF を送る
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(registry.as_bytes()).ok();
        }

        let status = loop {
            if self.cancel.is_cancelled() {
                tracing::warn!(helper = %helper_cmd, "Cancelling credential helper");
                child.kill().ok();
                child.wait().ok();
                return Err(BuildError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(HELPER_POLL_INTERVAL),
                Err(e) => return Err(helper_failed(format!("Credential helper failed: {}", e))),
            }
        };

        let mut stdout = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_end(&mut stdout)
                .map_err(|e| helper_failed(format!("Credential helper failed: {}", e)))?;
        }

        if !status.success() {
            // credential helper が認証情報を持っていない場合は None を返す
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                err.read_to_string(&mut stderr).ok();
            }
            tracing::debug!(
                "Credential helper returned error for {}: {}",
                registry,
                stderr.trim()
            );
            return Ok(None);
        }

        let response: CredentialResponse = serde_json::from_slice(&stdout).map_err(|e| {
            helper_failed(format!("Failed to parse credential helper response: {}", e))
        })?;

        Ok(Some(Credentials::new(
            registry,
            response.username,
            SecretHandle::new(response.secret),
        )))
    }
}

/// config.json 上でレジストリを探す際のキー候補
fn lookup_keys(registry: &str) -> Vec<String> {
    let mut keys = vec![registry.to_string(), format!("https://{}", registry)];
    if registry == DOCKER_HUB {
        keys.extend(DOCKER_HUB_ALIASES.iter().map(|k| k.to_string()));
    }
    keys
}

/// 認証情報の取得元
#[derive(Debug, Clone)]
enum CredentialSource {
    /// ユーザーが明示的に指定した値（ストアは参照しない）
    Explicit {
        username: String,
        password: SecretHandle,
    },
    /// ローカルの credential store
    Store(RegistryAuth),
}

/// 役割（pull / push）ごとの認証情報リゾルバ
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    source: CredentialSource,
}

impl CredentialResolver {
    pub fn explicit(username: impl Into<String>, password: SecretHandle) -> Self {
        Self {
            source: CredentialSource::Explicit {
                username: username.into(),
                password,
            },
        }
    }

    pub fn from_store(store: RegistryAuth) -> Self {
        Self {
            source: CredentialSource::Store(store),
        }
    }

    /// CLI の入力から作成
    ///
    /// ユーザー名とパスワードは両方指定するか、どちらも省略する必要がある。
    pub fn from_parts(
        username: Option<String>,
        password: Option<SecretHandle>,
        store: RegistryAuth,
    ) -> BuildResult<Self> {
        match (username, password) {
            (Some(username), Some(password)) => {
                if username.is_empty() || password.is_empty() {
                    return Err(BuildError::InvalidCredentials(
                        "username and password must not be empty".to_string(),
                    ));
                }
                Ok(Self::explicit(username, password))
            }
            (None, None) => Ok(Self::from_store(store)),
            (Some(_), None) => Err(BuildError::InvalidCredentials(
                "a username was given without a password".to_string(),
            )),
            (None, Some(_)) => Err(BuildError::InvalidCredentials(
                "a password was given without a username".to_string(),
            )),
        }
    }

    /// 認証情報を解決する。見つからない場合は `Ok(None)`
    pub fn resolve_optional(&self, reference: &ImageReference) -> BuildResult<Option<Credentials>> {
        let registry = reference.registry();
        match &self.source {
            CredentialSource::Explicit { username, password } => Ok(Some(Credentials::new(
                registry,
                username.clone(),
                password.clone(),
            ))),
            CredentialSource::Store(store) => store.lookup(registry),
        }
    }
}

impl CredentialProvider for CredentialResolver {
    fn resolve(&self, reference: &ImageReference) -> BuildResult<Credentials> {
        self.resolve_optional(reference)?
            .ok_or_else(|| BuildError::AuthResolutionFailed {
                registry: reference.registry().to_string(),
                message: match &self.source {
                    CredentialSource::Store(store) => format!(
                        "no credentials found in {}",
                        store.config_path().display()
                    ),
                    CredentialSource::Explicit { .. } => "no credentials found".to_string(),
                },
            })
    }
}

impl<P: CredentialProvider + ?Sized> CredentialProvider for &P {
    fn resolve(&self, reference: &ImageReference) -> BuildResult<Credentials> {
        (**self).resolve(reference)
    }
}

/// レジストリホスト単位の認証情報キャッシュ
///
/// 1回の実行の中で追加のみ行い、無効化はしない。
#[derive(Debug)]
pub struct CredentialCache<P> {
    provider: P,
    by_host: HashMap<String, Credentials>,
}

impl<P: CredentialProvider> CredentialCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            by_host: HashMap::new(),
        }
    }

    /// キャッシュ済みならそれを返し、なければ解決して保存
    pub fn get_or_resolve(&mut self, reference: &ImageReference) -> BuildResult<&Credentials> {
        let host = reference.registry();
        if !self.by_host.contains_key(host) {
            let credentials = self.provider.resolve(reference)?;
            tracing::debug!(registry = %host, "Resolved registry credentials");
            self.by_host.insert(host.to_string(), credentials);
        }
        Ok(&self.by_host[host])
    }

    /// すべての公開先ホストの認証情報を解決
    ///
    /// 1つでも解決できなければエラーを返す。
    pub fn prepare(&mut self, targets: &[TargetReference]) -> BuildResult<()> {
        for target in targets {
            self.get_or_resolve(&target.to_image_reference()?)?;
        }
        Ok(())
    }
}
