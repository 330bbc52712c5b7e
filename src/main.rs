use clap::Parser;
use linksync_lib::commands::{self, Cli};
use linksync_lib::logging::{file_writer, get_config_dir, LogConfig};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

fn env_filter(level: tracing::Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    // 隐藏 HTTP 库的调试输出
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// 初始化日志系统
///
/// 文件日志记录配置的级别；控制台只输出警告以上，除非命令行指定了级别。
fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let mut config = LogConfig::load(&get_config_dir());
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.directory = Some(dir.clone());
    }

    let console_level = if cli.log_level.is_some() {
        LevelFilter::from_level(config.tracing_level())
    } else {
        LevelFilter::WARN
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level);

    let mut guard = None;
    let file_layer = if config.enabled {
        match file_writer(&config.log_dir(), config.max_size_mb) {
            Ok((writer, worker_guard)) => {
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false)
                        .with_filter(env_filter(config.tracing_level())),
                )
            }
            Err(e) => {
                // 文件日志创建失败，只输出到控制台
                eprintln!("无法创建日志文件: {}", e);
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(&cli);

    match commands::sync::run(cli.sync).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("同步失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
