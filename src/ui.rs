use colored::*;
use terminal_size::{Width, Height, terminal_size};

pub fn print_header(title: &str, server_url: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = (width.0 as usize).min(80);

    let line = "═".repeat(width);
    println!("{}", line.black().bold());

    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  🎯 {} {}", title.yellow().bold(), version);
    println!("  {}", server_url.cyan());

    println!("{}", line.black().bold());
}

pub fn print_section(msg: &str) {
    println!();
    println!("{}", msg.bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_detail(label: &str, value: &str) {
    println!("    {} {}", format!("{}:", label).black().bold(), value);
}

pub fn print_info(msg: &str) {
    println!("  {} {}", "ℹ".blue().bold(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

/// Shorten a long response body for display
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
