//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Dollar amount with thousands separators
pub fn format_price(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = format!("{:.2}", amount.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{}", sign, grouped, frac)
}

/// Color R² by fit quality
pub fn color_r2(r2: f64) -> String {
    let formatted = format!("{:.4}", r2);
    if r2 >= 0.8 {
        formatted.green().to_string()
    } else if r2 >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(374000.0), "$374,000.00");
        assert_eq!(format_price(999.999), "$1,000.00");
        assert_eq!(format_price(12.5), "$12.50");
        assert_eq!(format_price(-1234567.891), "-$1,234,567.89");
        assert_eq!(format_price(0.0), "$0.00");
    }

    #[test]
    fn test_color_r2_keeps_value() {
        colored::control::set_override(false);
        assert_eq!(color_r2(0.91234), "0.9123");
        assert_eq!(color_r2(-0.5), "-0.5000");
    }
}
