//! Fixed-layout evaluation report.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{metrics::PrfReport, TrainingError};

const LABELS: [&str; 2] = ["Good", "Bad"];

/// Renders the report for one evaluation; `timestamp` goes into the banner.
pub fn format_report(report: &PrfReport, epoch: usize, val_loss: f32, timestamp: &str) -> String {
    let m = &report.matrix;
    let pct = |v: f64| v * 100.0;
    let row = |label: &str, r: &[u64; 3]| format!("{:>6}|{:>6}|{:>6}|{:>6}", label, r[0], r[1], r[2]);
    let class = |i: usize| {
        format!(
            "\t{:>6}: P ={:>6.2}%, R ={:>6.2}%, F ={:>6.2}%",
            LABELS[i],
            pct(report.each_prf[0][i]),
            pct(report.each_prf[1][i]),
            pct(report.each_prf[2][i])
        )
    };

    let lines = [
        "\n\n**********************************************************************************".to_string(),
        "*                                                                                *".to_string(),
        format!("*                           {timestamp}                                  *"),
        "*                                                                                *".to_string(),
        "**********************************************************************************\n".to_string(),
        format!("------------  Epoch {epoch}, val_loss: {val_loss}  -----------"),
        "Confusion matrix:".to_string(),
        format!("{:>6}|{:>6}|{:>6}|<-- classified as", " ", LABELS[0], LABELS[1]),
        format!("------|-------------|{:>6}", "-SUM-"),
        row(LABELS[0], &m[0]),
        row(LABELS[1], &m[1]),
        "------|-------------|------".to_string(),
        row("-SUM-", &m[2]),
        format!("\nAccuracy = {:6.2}%\n", pct(report.acc)),
        "Results for the individual labels:".to_string(),
        class(0),
        class(1),
        "\n<<Official Score>>Macro-averaged result:".to_string(),
        format!(
            "P ={:>6.2}%, R ={:>6.2}%, F ={:>6.2}%",
            pct(report.macro_prf[0]),
            pct(report.macro_prf[1]),
            pct(report.macro_prf[2])
        ),
        "--------------------------------------------------\n".to_string(),
    ];
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Path of the log a report of `metrics_type` is appended to.
pub fn log_path(save_dir: &Path, metrics_type: &str) -> PathBuf {
    save_dir.join(format!("{metrics_type}_logs.log"))
}

/// Prints the report and appends it to `<save_dir>/<metrics_type>_logs.log`.
pub fn print_metrics(
    report: &PrfReport,
    epoch: usize,
    val_loss: f32,
    metrics_type: &str,
    save_dir: Option<&Path>,
) -> Result<String, TrainingError> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let text = format_report(report, epoch, val_loss, &timestamp);
    print!("{text}");

    if let Some(dir) = save_dir {
        std::fs::create_dir_all(dir)?;
        let path = log_path(dir, metrics_type);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(text.as_bytes())?;
        log::debug!("appended {metrics_type} report to {}", path.display());
    }
    Ok(text)
}
