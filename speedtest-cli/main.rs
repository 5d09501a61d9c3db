// speedtest-cli 入口：对运行中的测速服务执行一次完整测速并展示结果。
mod args;
mod render;

use anyhow::Result;
use args::Cli;
use clap::Parser;
use speedtest_server::client::{RunOptions, SpeedtestClient};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let client = SpeedtestClient::new(&cli.server)?;

    if !cli.json {
        match client.server_info().await {
            Ok(info) => render::render_location("服务器", &info),
            Err(err) => warn!("获取服务器信息失败: {err:#}"),
        }
        match client.client_info().await {
            Ok(info) => render::render_location("本机", &info),
            Err(err) => warn!("获取本机信息失败: {err:#}"),
        }
    }

    let options = RunOptions {
        pings: cli.pings as usize,
        download_mb: cli.download_mb,
        upload_mb: cli.upload_mb,
        save: !cli.no_save,
    };
    let report = client.run(options).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    render::render_report(&report);
    match client.best_records().await {
        Ok(best) => render::render_best(&best),
        Err(err) => warn!("获取个人最佳失败: {err:#}"),
    }
    match client.leaderboard().await {
        Ok(top) => render::render_leaderboard(&top),
        Err(err) => warn!("获取排行榜失败: {err:#}"),
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
