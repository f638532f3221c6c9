//! Directory listing format
//!
//! LIST output in the Unix `ls -l` shape most clients know how to parse.

use chrono::{DateTime, Duration, Local};
use std::time::SystemTime;

/// One entry of a directory snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub readonly: bool,
    pub modified: SystemTime,
}

/// Format one `ls -l` line, e.g. `-rw-r--r-- 1 ftp ftp 1024 Jan 01 12:00 notes.txt`
pub fn format_entry(entry: &DirEntry, now: DateTime<Local>) -> String {
    let mode = match (entry.is_dir, entry.readonly) {
        (true, false) => "drwxr-xr-x",
        (true, true) => "dr-xr-xr-x",
        (false, false) => "-rw-r--r--",
        (false, true) => "-r--r--r--",
    };

    let modified: DateTime<Local> = entry.modified.into();
    // ls shows the year instead of the time for entries older than six months
    let date = if now.signed_duration_since(modified) > Duration::days(180) || modified > now {
        modified.format("%b %d  %Y")
    } else {
        modified.format("%b %d %H:%M")
    };

    format!(
        "{mode} 1 ftp ftp {size:>12} {date} {name}",
        size = entry.size,
        name = entry.name
    )
}

/// Full LIST payload, CRLF-terminated lines
pub fn format_listing(entries: &[DirEntry]) -> Vec<u8> {
    let now = Local::now();
    entries
        .iter()
        .map(|entry| format!("{}\r\n", format_entry(entry, now)))
        .collect::<String>()
        .into_bytes()
}
