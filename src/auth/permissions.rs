//! Per-user permissions
//!
//! Parsed from a letter string such as `"elradfmw"`. Unknown letters are ignored.

/// An operation gated by a permission letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `e`: CWD, CDUP
    ChangeDir,
    /// `l`: LIST
    List,
    /// `r`: RETR
    Read,
    /// `a`: STOR with a restart offset
    Append,
    /// `d`: DELE, RMD
    Delete,
    /// `m`: MKD
    MakeDir,
    /// `w`: STOR
    Write,
}

impl Access {
    fn bit(self) -> u8 {
        match self {
            Access::ChangeDir => 1 << 0,
            Access::List => 1 << 1,
            Access::Read => 1 << 2,
            Access::Append => 1 << 3,
            Access::Delete => 1 << 4,
            Access::MakeDir => 1 << 5,
            Access::Write => 1 << 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u8);

impl Permissions {
    pub fn parse(letters: &str) -> Self {
        let bits = letters
            .chars()
            .filter_map(|c| match c {
                'e' => Some(Access::ChangeDir),
                'l' => Some(Access::List),
                'r' => Some(Access::Read),
                'a' => Some(Access::Append),
                'd' => Some(Access::Delete),
                'm' => Some(Access::MakeDir),
                'w' => Some(Access::Write),
                _ => None,
            })
            .fold(0, |acc, access| acc | access.bit());
        Self(bits)
    }

    pub fn allows(&self, access: Access) -> bool {
        self.0 & access.bit() != 0
    }
}
