use crate::utils;
use clap::Args;
use colored::Colorize;
use deployer_build::{
    BuildError, BuildProgress, BuildRequest, BuildResult, CREATED_LABEL, CancelSignal,
    ContainerEngine, CredentialCache, CredentialResolver, Credentials, DockerEngine,
    ImageReference, ImagePusher, ImageSpec, LabelSet, RegistryAuth, SecretHandle,
    TargetReference, export_artifact,
};
use deployer_config::{
    DeployerConfig, ENV_BUILD_ID, ENV_PULL_PASSWORD, ENV_PULL_USERNAME, ENV_PUSH_PASSWORD,
    ENV_PUSH_USERNAME,
};
use std::path::PathBuf;

/// build コマンドの引数
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// 公開先のリポジトリ（例: ghcr.io/owner/app）
    #[arg(short, long)]
    pub repository: String,

    /// 公開するタグ（複数指定可）
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// ビルド固有の識別子。常にタグとして公開される
    #[arg(short, long, env = ENV_BUILD_ID)]
    pub identifier: String,

    /// ビルド後にレジストリへ公開
    #[arg(long)]
    pub publish: bool,

    /// 公開先レジストリのユーザー名
    #[arg(long, env = ENV_PUSH_USERNAME)]
    pub username: Option<String>,

    /// 公開先レジストリのパスワード
    #[arg(long, env = ENV_PUSH_PASSWORD, hide_env_values = true)]
    pub password: Option<SecretHandle>,

    /// ビルド前に取得するベースイメージ
    #[arg(long, value_name = "IMAGE")]
    pub pull: Option<String>,

    /// ベースイメージ取得用のユーザー名
    #[arg(long, env = ENV_PULL_USERNAME)]
    pub pull_username: Option<String>,

    /// ベースイメージ取得用のパスワード
    #[arg(long, env = ENV_PULL_PASSWORD, hide_env_values = true)]
    pub pull_password: Option<SecretHandle>,

    /// イメージに付けるラベル (key=value、複数指定可)
    #[arg(short, long = "label", value_name = "KEY=VALUE")]
    pub labels: Vec<String>,

    /// ビルドコンテキストのディレクトリ
    #[arg(short, long, default_value = ".")]
    pub context: PathBuf,

    /// コンテキストからの Dockerfile のパス
    #[arg(short = 'f', long, default_value = "Dockerfile")]
    pub dockerfile: PathBuf,

    /// マルチステージビルドのターゲット
    #[arg(long)]
    pub target: Option<String>,

    /// ターゲットプラットフォーム（例: linux/amd64）
    #[arg(long)]
    pub platform: Option<String>,

    /// キャッシュを使用しない
    #[arg(long)]
    pub no_cache: bool,

    /// イメージ tar の出力先
    #[arg(long, value_name = "DIR")]
    pub artifacts_dir: Option<PathBuf>,
}

/// ビルドコマンドを処理
///
/// 入力と認証情報をすべて検証してからエンジンに接続する。公開時は
/// タグごとの失敗を [`BuildError::PublishFailed`] にまとめて返す。
pub async fn handle_build_command(
    config: DeployerConfig,
    args: BuildArgs,
    cancel: CancelSignal,
) -> anyhow::Result<()> {
    let config = match args.artifacts_dir {
        Some(dir) => config.with_artifacts_dir(dir),
        None => config,
    };

    // 入力の検証
    let base = ImageReference::parse(&args.repository)?;
    if base.tag().is_some() || base.digest().is_some() {
        return Err(BuildError::InvalidReference {
            reference: args.repository.clone(),
            message: "repository must not include a tag or digest; use --tag".to_string(),
        }
        .into());
    }

    let spec = ImageSpec::new(base.name(), &args.identifier, &args.tags);
    spec.validate()?;
    let targets = spec.targets();

    let pull_reference = args
        .pull
        .as_deref()
        .map(ImageReference::parse)
        .transpose()?;

    let mut labels = LabelSet::new();
    labels.insert(
        CREATED_LABEL,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    let rejected = labels.extend_entries(&args.labels);
    utils::print_rejected_labels(&rejected);

    let context = config.root().join(&args.context);
    let mut request =
        BuildRequest::new(&context, context.join(&args.dockerfile), spec.local_name());
    request.labels = labels;
    request.target = args.target;
    request.platform = args.platform;
    request.no_cache = args.no_cache;
    request.validate()?;

    let artifact = config
        .artifact_path(base.name())
        .map_err(|e| BuildError::InvalidReference {
            reference: base.name().to_string(),
            message: e.to_string(),
        })?;

    // 認証情報の解決（エンジン接続前に行う）
    let store = match config.docker_config() {
        Some(dir) => RegistryAuth::with_config_dir(dir),
        None => RegistryAuth::new(),
    }
    .with_cancel(cancel.clone());
    let push_resolver =
        CredentialResolver::from_parts(args.username, args.password, store.clone())?;
    let pull_resolver =
        CredentialResolver::from_parts(args.pull_username, args.pull_password, store)?;

    // credential helper はブロッキングで実行される
    let lookup_pull = pull_reference.clone();
    let lookup_targets = if args.publish {
        targets.clone()
    } else {
        Vec::new()
    };
    let (pull_credentials, push_credentials) = tokio::task::spawn_blocking(move || {
        resolve_credentials(pull_resolver, lookup_pull.as_ref(), push_resolver, &lookup_targets)
    })
    .await??;

    println!("{}", "Dockerイメージをビルド中...".green());
    println!("イメージ: {}", spec.local_name().cyan());
    if args.publish {
        utils::print_targets(&targets);
    }

    // Docker接続
    println!();
    println!("{}", "Dockerに接続中...".blue());
    let engine = DockerEngine::connect().await?;

    if let Some(reference) = &pull_reference {
        println!("  ↓ ベースイメージを取得中: {}", reference.to_string().cyan());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BuildError::Cancelled.into()),
            result = engine.pull(reference, pull_credentials.as_ref()) => result?,
        }
    }

    let progress = BuildProgress::new(&spec.local_name());
    let built = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BuildError::Cancelled),
        result = engine.build(&request) => result,
    };
    let image = match built {
        Ok(image) => {
            progress.finish_success(&format!("Built {}", image.name));
            image
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            return Err(e.into());
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BuildError::Cancelled.into()),
        result = export_artifact(&engine, &image, &artifact) => result?,
    }
    println!("  {} Built image: {}", "✓".green(), artifact.display().to_string().cyan());

    if !args.publish {
        return Ok(());
    }

    println!();
    println!("{}", "📤 イメージを公開中...".blue().bold());

    let mut pusher = ImagePusher::from_cache(&engine, push_credentials).with_cancel(cancel);
    let report = pusher.publish(&image, &targets).await?;
    utils::print_report(&report);

    report.into_result()?;
    Ok(())
}

/// pull 用と公開用の認証情報を解決する
///
/// pull 側はエントリが見つからなければ匿名で取得するが、ストア自体を
/// 読めない場合はエラー。公開側はすべての公開先ホストで解決できなければエラー。
fn resolve_credentials(
    pull: CredentialResolver,
    pull_reference: Option<&ImageReference>,
    push: CredentialResolver,
    publish_targets: &[TargetReference],
) -> BuildResult<(Option<Credentials>, CredentialCache<CredentialResolver>)> {
    let pull_credentials = match pull_reference {
        Some(reference) => pull.resolve_optional(reference)?,
        None => None,
    };
    if pull_reference.is_some() && pull_credentials.is_none() {
        tracing::info!("No pull credentials found, pulling anonymously");
    }

    let mut push_credentials = CredentialCache::new(push);
    push_credentials.prepare(publish_targets)?;
    Ok((pull_credentials, push_credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use deployer_build::ExitStatus;
    use std::fs;
    use std::path::Path;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn store(dir: &Path, content: &str) -> RegistryAuth {
        fs::write(dir.join("config.json"), content).unwrap();
        RegistryAuth::with_config_dir(dir)
    }

    fn reference(s: &str) -> ImageReference {
        ImageReference::parse(s).unwrap()
    }

    fn push_targets() -> Vec<TargetReference> {
        ImageSpec::new("registry.example/app", "build-42", ["v1"]).targets()
    }

    #[test]
    fn test_passwords_are_not_printable() {
        let cli = TestCli::try_parse_from([
            "deployer",
            "-r",
            "registry.example/app",
            "-i",
            "build-42",
            "--username",
            "ci",
            "--password",
            "hunter2",
            "--pull-username",
            "reader",
            "--pull-password",
            "pull-s3cret",
        ])
        .unwrap();

        let rendered = format!("{:?}", cli.args);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pull-s3cret"));
        assert_eq!(cli.args.password, Some(SecretHandle::new("hunter2")));
    }

    #[test]
    fn test_pull_and_push_use_separate_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = "cmVhZGVyOnB1bGwtdG9rZW4="; // reader:pull-token
        let store = store(
            dir.path(),
            &format!(r#"{{"auths": {{"base.example": {{"auth": "{}"}}}}}}"#, encoded),
        );
        let push = CredentialResolver::from_parts(
            Some("ci".to_string()),
            Some(SecretHandle::new("push-token")),
            store.clone(),
        )
        .unwrap();
        let pull = CredentialResolver::from_parts(None, None, store).unwrap();

        let (pull_credentials, mut push_credentials) = resolve_credentials(
            pull,
            Some(&reference("base.example/base:1")),
            push,
            &push_targets(),
        )
        .unwrap();

        let pulled = pull_credentials.unwrap();
        assert_eq!(pulled.server_address(), "base.example");
        assert_eq!(pulled.username(), "reader");

        let pushed = push_credentials
            .get_or_resolve(&reference("registry.example/app"))
            .unwrap();
        assert_eq!(pushed.server_address(), "registry.example");
        assert_eq!(pushed.username(), "ci");
    }

    #[test]
    fn test_missing_pull_entry_pulls_anonymously() {
        let dir = tempfile::tempdir().unwrap();
        let pull = CredentialResolver::from_store(store(dir.path(), r#"{"auths": {}}"#));
        let push = CredentialResolver::explicit("ci", SecretHandle::new("push-token"));

        let (pull_credentials, _) = resolve_credentials(
            pull,
            Some(&reference("base.example/base:1")),
            push,
            &push_targets(),
        )
        .unwrap();
        assert!(pull_credentials.is_none());
    }

    #[test]
    fn test_unreadable_pull_store_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let push = CredentialResolver::explicit("ci", SecretHandle::new("push-token"));

        let pull = CredentialResolver::from_store(store(dir.path(), "{not json"));
        let err = resolve_credentials(
            pull,
            Some(&reference("base.example/base:1")),
            push.clone(),
            &[],
        )
        .unwrap_err();
        assert_eq!(ExitStatus::from_build_error(&err).code(), 78);

        let pull = CredentialResolver::from_store(store(
            dir.path(),
            r#"{"credHelpers": {"base.example": "deployer-test-missing-helper"}}"#,
        ));
        let err = resolve_credentials(pull, Some(&reference("base.example/base")), push, &[])
            .unwrap_err();
        assert_eq!(ExitStatus::from_build_error(&err).code(), 78);
    }

    #[test]
    fn test_push_store_is_not_consulted_without_publish() {
        let dir = tempfile::tempdir().unwrap();
        let push = CredentialResolver::from_store(store(dir.path(), r#"{"auths": {}}"#));
        let pull = CredentialResolver::explicit("reader", SecretHandle::new("pull-token"));

        let (pull_credentials, _) = resolve_credentials(pull, None, push, &[]).unwrap();
        assert!(pull_credentials.is_none());
    }
}
