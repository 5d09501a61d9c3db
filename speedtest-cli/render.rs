use speedtest_server::client::RunReport;
use speedtest_server::ip_info::ClientInfo;
use speedtest_server::records::Record;
use speedtest_server::schemas::BestRecordsResponse;

pub fn render_location(label: &str, info: &ClientInfo) {
    println!(
        "{label}: {} / {} {} / {}",
        info.ip, info.country, info.city, info.isp
    );
}

pub fn render_report(report: &RunReport) {
    match report.latency {
        Some(summary) => println!(
            "延迟: {:.2} ms  抖动: {:.2} ms  ({} 次)",
            summary.mean_ms, summary.jitter_ms, summary.samples
        ),
        None => println!("延迟: -"),
    }
    println!(
        "下载: {:.2} Mbps  ({} 字节, {:.0} ms)",
        report.download.mbps, report.download.bytes, report.download.elapsed_ms
    );
    println!(
        "上传: {:.2} Mbps  ({} 字节, {:.0} ms)",
        report.upload.mbps, report.upload.bytes, report.upload.elapsed_ms
    );
    if let Some(saved) = &report.saved {
        println!("已保存，记录身份: {}", saved.ip);
    }
}

pub fn render_best(best: &BestRecordsResponse) {
    let Some(records) = &best.records else {
        println!("暂无 {} 的历史记录", best.ip);
        return;
    };
    println!("个人最佳 ({}):", best.ip);
    println!("  最快下载: {:.2} Mbps  {}", records.download.download, records.download.date);
    println!("  最快上传: {:.2} Mbps  {}", records.upload.upload, records.upload.date);
    println!("  最低延迟: {:.2} ms    {}", records.latency.latency, records.latency.date);
}

pub fn render_leaderboard(top: &[Record]) {
    println!("本周排行榜:");
    if top.is_empty() {
        println!("  (空)");
        return;
    }
    for line in leaderboard_lines(top) {
        println!("{line}");
    }
}

fn leaderboard_lines(top: &[Record]) -> Vec<String> {
    top.iter()
        .enumerate()
        .map(|(index, record)| {
            format!(
                "  {:>2}. {:<18} 下载 {:>8.2}  上传 {:>8.2}  延迟 {:>7.2}  {}",
                index + 1,
                record.identity,
                record.download,
                record.upload,
                record.latency,
                record.date
            )
        })
        .collect()
}
