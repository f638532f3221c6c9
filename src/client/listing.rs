//! LIST output parsing
//!
//! Best effort: Unix `ls -l` lines are split into fields, anything else is
//! kept as a raw entry so callers can still show it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// The line could not be parsed
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub permissions: Option<String>,
    /// Date column as sent, e.g. `Jan 01 12:00`
    pub modified: Option<String>,
    /// Symlink target, when the server shows one
    pub target: Option<String>,
    pub raw: String,
}

impl ListEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    fn raw(line: &str) -> Self {
        Self {
            name: line.to_string(),
            kind: EntryKind::Unknown,
            size: None,
            permissions: None,
            modified: None,
            target: None,
            raw: line.to_string(),
        }
    }
}

/// Split off `n` whitespace-separated fields; the rest of the line is returned whole.
fn split_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    Some((fields, rest.trim_start()))
}

pub fn parse_list_line(line: &str) -> ListEntry {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some((fields, name)) = split_fields(line, 8) else {
        return ListEntry::raw(line);
    };
    if name.is_empty() {
        return ListEntry::raw(line);
    }

    let permissions = fields[0];
    let kind = match permissions.chars().next() {
        Some('d') => EntryKind::Directory,
        Some('l') => EntryKind::Symlink,
        Some('-') => EntryKind::File,
        _ => return ListEntry::raw(line),
    };
    let Ok(size) = fields[4].parse::<u64>() else {
        return ListEntry::raw(line);
    };

    let (name, target) = match (kind, name.split_once(" -> ")) {
        (EntryKind::Symlink, Some((name, target))) => (name, Some(target.to_string())),
        _ => (name, None),
    };

    ListEntry {
        name: name.to_string(),
        kind,
        size: Some(size),
        permissions: Some(permissions.to_string()),
        modified: Some(fields[5..8].join(" ")),
        target,
        raw: line.to_string(),
    }
}

/// Parse a whole LIST payload, skipping blank lines and `total N` headers
pub fn parse_listing(text: &str) -> Vec<ListEntry> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !l.starts_with("total "))
        .map(parse_list_line)
        .collect()
}
