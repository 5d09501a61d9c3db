use clap::Parser;

/// Speedtest CLI（命令行测速）
///
/// Runs latency → download → upload → save against a speedtest server.
/// 依次执行延迟、下载、上传与保存，并打印个人最佳与本周排行榜。
#[derive(Debug, Parser)]
#[command(author, version, bin_name = "speedtest-cli")]
pub struct Cli {
    /// Server base URL / 测速服务地址。
    #[arg(long, short = 's', default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Download size in MB / 下载测试大小（MB，服务端上限 100）。
    #[arg(long = "download-mb", default_value_t = 20)]
    pub download_mb: u64,

    /// Upload size in MB / 上传测试大小（MB）。
    #[arg(long = "upload-mb", default_value_t = 10)]
    pub upload_mb: u64,

    /// Number of latency probes / 延迟探测次数。
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub pings: u64,

    /// Skip saving the result / 不保存本次结果。
    #[arg(long = "no-save", default_value_t = false)]
    pub no_save: bool,

    /// Output the report as JSON / 以 JSON 输出报告。
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
