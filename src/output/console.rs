//! Console output utilities.

use console::style;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = format!(
        r#"
╔═══════════════════════════════════════════════════════╗
║     mloader {:<42}║
║     MangaPlus chapter downloader                      ║
╚═══════════════════════════════════════════════════════╝
"#,
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style(banner).cyan());
}

/// Print what is about to be downloaded.
pub fn print_config_summary(titles: &[u32], chapters: &[u32], format: &str, out_dir: &str) {
    let join = |ids: &[u32]| {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!();
    println!("{}", style("Configuration:").bold());
    if !titles.is_empty() {
        println!("  Titles:    {}", join(titles));
    }
    if !chapters.is_empty() {
        println!("  Chapters:  {}", join(chapters));
    }
    println!("  Format:    {}", format);
    println!("  Directory: {}", out_dir);
    println!();
}
