//! Startup banner and session summary display.

use std::time::Duration;

use crate::bridge::CallStats;
use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub engine: &'a str,
    pub post_message: &'a str,
    pub timeout: Duration,
    pub preferences: &'a str,
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║        S C O R E B R I D G E          ║
   ║   notation engine, one call at a time ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   engine    {}
   channel   {}
   timeout   {:?}
   prefs     {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.engine,
        info.post_message,
        info.timeout,
        info.preferences,
    );
}

/// Print the session summary (call counts + farewell).
pub fn print_session_summary(stats: CallStats) {
    if stats.issued > 0 {
        println!(
            "session: {} calls, {} ok, {} failed, {} timed out",
            format_number(stats.issued),
            format_number(stats.succeeded),
            format_number(stats.failed),
            format_number(stats.timed_out),
        );
    }
    println!("goodbye.");
}
