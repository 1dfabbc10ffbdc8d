use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use whisperer_client::UsageStatus;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("{}: {}", label.cyan(), value);
}

/// Renders rows under `header` as a rounded table.
pub fn print_table<R, I>(header: &[&str], rows: R)
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = String>,
{
    let mut builder = Builder::default();
    builder.push_record(header.iter().map(|h| h.to_string()));
    for row in rows {
        builder.push_record(row);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn status_label(status: UsageStatus) -> String {
    match status {
        UsageStatus::Ok => "ok".green().to_string(),
        UsageStatus::Low => "running low".yellow().to_string(),
        UsageStatus::Exhausted => "exhausted".red().bold().to_string(),
    }
}

/// Text progress bar, `width` cells wide.
pub fn usage_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_bar() {
        assert_eq!(usage_bar(0.0, 10), "[----------]");
        assert_eq!(usage_bar(85.0, 10), "[#########-]");
        assert_eq!(usage_bar(250.0, 4), "[####]");
    }
}
