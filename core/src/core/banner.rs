//! Startup banner

use super::constants::APP_NAME;

/// Print the startup banner: version, bind address, and the backend each
/// adapter resolved to (durable or in-memory).
pub fn print_banner(host: &str, port: u16, stream_backend: &str, store_backend: &str) {
    const W: usize = 16;

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m http://{}:{}",
        "API:", host, port
    );
    println!(
        "  \x1b[90m➜  {:<W$} {}\x1b[0m",
        "Stream substrate:", stream_backend
    );
    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Store:", store_backend);
    println!();
}
