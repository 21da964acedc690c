use clap::Parser;
use colored::Colorize;
use orchard_build::{BuildError, builder_module};
use orchard_core::{ConsoleLogger, Context, CoreError, Profile, Registry};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "orchard")]
#[command(about = "モジュール単位でビルドなどの開発作業を実行する", long_about = None)]
#[command(version)]
#[command(after_help = "Usage: orchard <module> [action] [args...]\n\n  orchard builder build --nocache --specdir ./_builder")]
struct Cli {
    /// 詳細なログを出力
    #[arg(short, long)]
    verbose: bool,

    /// ビルド時に渡すレジストリ認証情報
    #[arg(
        long,
        env = "ARTIFACTORY_PASSWORD",
        hide_env_values = true,
        hide = true
    )]
    registry_credential: Option<String>,

    /// <module> [action] [args...]
    #[arg(
        value_name = "MODULE",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(builder_module());
    registry
}

fn print_usage(registry: &Registry) {
    eprintln!();
    eprintln!("Usage: orchard <module> [action] [args...]");
    eprintln!();
    eprintln!("{}", "Available modules:".yellow());
    for name in registry.module_names() {
        let actions = registry
            .module(name)
            .map(|m| m.action_names().join(", "))
            .unwrap_or_default();
        eprintln!("  {} ({})", name.cyan(), actions);
    }
}

/// ビルドエラーなら解決方法のヒントを返す
fn action_hint(err: &anyhow::Error) -> Option<String> {
    let build_error = err.downcast_ref::<BuildError>()?;
    build_error
        .user_message()
        .split_once('\n')
        .map(|(_, hint)| hint.trim().to_string())
        .filter(|hint| !hint.is_empty())
}

/// ディスパッチして終了コードを返す
async fn run(registry: &Registry, ctx: &Context, args: &[String]) -> i32 {
    ctx.log().info(&format!("Current profile: {}\n", ctx.profile().name));

    match registry.dispatch(ctx, args).await {
        Ok(()) => 0,
        Err(CoreError::ActionFailed(e)) => {
            eprintln!("{} {:#}", "Action Error:".red().bold(), e);
            if let Some(hint) = action_hint(&e) {
                eprintln!();
                eprintln!("{}", hint);
            }
            2
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            if matches!(
                e,
                CoreError::MissingModule { .. } | CoreError::ModuleNotFound { .. }
            ) {
                print_usage(registry);
            }
            e.exit_code()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let registry = registry();
    let ctx = Context::new(Arc::new(ConsoleLogger::new()), Profile::default())
        .with_registry_credential(cli.registry_credential.clone());
    tracing::debug!(?ctx, args = ?cli.args, "Starting");

    let code = run(&registry, &ctx, &cli.args).await;
    std::process::exit(code);
}
