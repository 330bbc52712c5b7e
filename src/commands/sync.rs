use crate::config::{load_devices, DeviceFilter};
use crate::core::engine::DeviceFailure;
use crate::core::{
    Device, DeviceOutcome, DeviceReport, FileAction, FileResult, FileScanner, FileStatus,
    RemoteDestination, RunSummary, ScanConfig, SyncEngine, SyncOptions, SyncPlan,
};
use anyhow::{bail, Context};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 同步参数
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// 打印机配置文件（.json 或 .toml）
    #[arg(short, long, default_value = "printers.json")]
    pub config: PathBuf,

    /// 只处理这些打印机（不区分大小写，可多次指定）
    #[arg(short = 'p', long = "printer", value_name = "NAME", num_args = 1..)]
    pub printers: Vec<String>,

    /// 排除这些打印机，指定了 --printer 时无效
    #[arg(short = 'x', long = "exclude", value_name = "NAME", num_args = 1..)]
    pub exclude: Vec<String>,

    /// 要同步的本地目录
    #[arg(short, long)]
    pub source: PathBuf,

    /// 打印机存储中的目标目录，默认为存储根目录；以 / 开头表示完整路径
    #[arg(short, long)]
    pub destination: Option<String>,

    /// 计算远程路径时以此目录为起点，默认为 source
    #[arg(short, long)]
    pub relative_to: Option<PathBuf>,

    /// 只同步这些后缀的文件
    #[arg(long = "suffix", value_name = "SUFFIX", num_args = 1.., default_value = ".gcode")]
    pub suffixes: Vec<String>,

    /// 执行修改（默认只预演）
    #[arg(short = 'g', long = "go")]
    pub execute: bool,

    /// 忽略打印机状态，打印中的设备也会被操作
    #[arg(long)]
    pub ignore_state: bool,

    /// 以 JSON 输出结果
    #[arg(long)]
    pub json: bool,
}

/// 展开 `~` 并转换为绝对路径
fn resolve_dir(path: &Path) -> anyhow::Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    };
    std::fs::canonicalize(&expanded).with_context(|| format!("无法访问目录 {}", path.display()))
}

/// 解析 source 与 relative_to，source 必须位于 relative_to 之下
pub fn resolve_paths(source: &Path, relative_to: Option<&Path>) -> anyhow::Result<(PathBuf, PathBuf)> {
    let source = resolve_dir(source)?;
    let relative_to = match relative_to {
        Some(path) => resolve_dir(path)?,
        None => source.clone(),
    };
    if !source.starts_with(&relative_to) {
        bail!(
            "源目录 {} 不在 {} 之下",
            source.display(),
            relative_to.display()
        );
    }
    Ok((source, relative_to))
}

/// 执行同步，返回是否全部成功
pub async fn run(args: SyncArgs) -> anyhow::Result<bool> {
    let configs = load_devices(&args.config)
        .with_context(|| format!("读取配置文件 {} 失败", args.config.display()))?;
    let filter = DeviceFilter::new(&args.printers, &args.exclude);

    let mut devices = Vec::new();
    let mut failures = Vec::new();
    for (name, config) in filter.apply(&configs) {
        match Device::from_config(name, config) {
            Ok(device) => devices.push(device),
            Err(e) => {
                warn!("{}: 创建连接失败: {}", name, e);
                failures.push(DeviceFailure {
                    device: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    if devices.is_empty() && failures.is_empty() {
        warn!("没有匹配的打印机");
        println!("没有需要处理的打印机。");
        return Ok(true);
    }

    let (source, relative_to) = resolve_paths(&args.source, args.relative_to.as_deref())?;
    let scanner = FileScanner::with_config(ScanConfig {
        suffixes: args.suffixes.clone(),
    });
    let local_files = scanner.scan(&source)?;
    info!("本地共 {} 个待同步文件", local_files.len());

    let options = SyncOptions {
        destination: args
            .destination
            .as_deref()
            .map(RemoteDestination::parse)
            .unwrap_or_default(),
        relative_to,
        ignore_state: args.ignore_state,
        execute: args.execute,
    };

    if !args.json {
        if options.execute {
            println!("将执行以下操作。");
        } else {
            println!("仅预演，不会执行这些操作（使用 -g/--go 执行）。");
        }
    }

    let mut summary = SyncEngine::new(options).run_all(devices, local_files).await?;
    summary.failures.extend(failures);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in summary_lines(&summary) {
            println!("{}", line);
        }
    }

    Ok(summary.success())
}

fn plan_lines(device: &str, plan: &SyncPlan) -> Vec<String> {
    let mut lines = vec![format!(
        "{} - {} 个文件待删除, {} 个缺失待上传, {} 个过期待刷新。",
        device,
        plan.excess_count(),
        plan.missing_count(),
        plan.stale_count()
    )];

    for target in &plan.targets {
        let verb = if target.stale { "刷新" } else { "上传" };
        lines.push(format!(
            "待{}到 {}: {} => {}",
            verb,
            device,
            target.local_path.display(),
            target.remote_path
        ));
    }
    for path in &plan.excess {
        lines.push(format!("待从 {} 删除: {}", device, path));
    }
    lines
}

fn result_line(device: &str, result: &FileResult) -> String {
    let verb = match result.action {
        FileAction::Delete => "删除",
        FileAction::Upload => "上传",
        FileAction::Refresh => "刷新",
    };
    match &result.status {
        FileStatus::Succeeded => format!("{} 已成功{} ({})", result.path, verb, device),
        FileStatus::Failed(reason) => {
            format!("{} {}失败 ({}): {}", result.path, verb, device, reason)
        }
        FileStatus::AlreadyAbsent => format!("{} 在 {} 上已不存在", result.path, device),
    }
}

fn report_lines(report: &DeviceReport) -> Vec<String> {
    let device = report.device.as_str();
    let mut lines = match &report.outcome {
        DeviceOutcome::Skipped { state } => vec![format!(
            "{} 当前状态为 {}，不会被访问。",
            device,
            state.map(|s| s.to_string()).unwrap_or_else(|| "未知".to_string())
        )],
        DeviceOutcome::Planned { plan } => plan_lines(device, plan),
        DeviceOutcome::Applied { plan, results } => {
            let mut lines = plan_lines(device, plan);
            lines.extend(results.iter().map(|r| result_line(device, r)));
            lines
        }
    };
    lines.push(format!("{} 完成。", device));
    lines
}

/// 生成面向用户的结果文本
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary.reports.iter().flat_map(report_lines).collect();
    for failure in &summary.failures {
        lines.push(format!("{} 同步失败: {}", failure.device, failure.reason));
    }
    lines
}
