//! 命令行定义

use clap::Parser;
use std::path::PathBuf;

pub mod sync;

pub use sync::SyncArgs;

/// 将本地目录中的打印文件同步到多台 PrusaLink 打印机
#[derive(Parser, Debug)]
#[command(name = "linksync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub sync: SyncArgs,

    /// 日志级别: error, warn, info, debug, trace（同时作用于控制台输出）
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// 日志文件目录，默认为缓存目录下的 linksync
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}
