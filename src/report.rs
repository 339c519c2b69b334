use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::theme::rule;

pub const TOOL_NAME: &str = "Adaptive Business Analyzer";

/// `Solar Kettle 2.0!` becomes `solar_kettle_20`.
///
/// Keeps ASCII and Unicode alphanumerics, spaces, `-` and `_`. Falls back to
/// `product` when nothing survives.
pub fn safe_file_stem(product: &str) -> String {
    let kept = product
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_'))
        .collect::<String>();
    let stem = kept.trim_end().to_lowercase().replace(' ', "_");
    if stem.trim_matches('_').is_empty() {
        "product".to_string()
    } else {
        stem
    }
}

pub fn report_file_name(product: &str) -> String {
    format!("{}_analysis.txt", safe_file_stem(product))
}

pub fn render_report(product: &str, body: &str, generated_at: DateTime<Local>) -> String {
    let rule = rule();
    format!(
        "Business Analysis Report for: {product}\n\
         {rule}\n\n\
         Generated on: {}\n\
         Tool: {TOOL_NAME}\n\
         {rule}\n\n\
         {body}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Write the report into `output_dir`, creating the directory if needed.
pub fn save_report(output_dir: &Path, product: &str, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            output_dir.display()
        )
    })?;
    let path = output_dir.join(report_file_name(product));
    let content = render_report(product, body, Local::now());
    std::fs::write(&path, content)
        .with_context(|| format!("failed to write report file '{}'", path.display()))?;
    tracing::info!(path = %path.display(), "report saved");
    Ok(path)
}
