//! Module `commands`
//!
//! Defines the FTP verbs the engine understands and the `Command` value
//! produced by the codec for every inbound line.

use std::fmt;

/// Represents an FTP verb parsed from the client input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    User,
    Pass,
    Quit,
    Pwd,
    Cwd,
    Cdup,
    List,
    Retr,
    Stor,
    Dele,
    Mkd,
    Rmd,
    Pasv,
    Port,
    Type,
    Rest,
    Abor,
    Noop,
    Syst,
    /// Anything else, upper-cased
    Unknown(String),
}

impl Verb {
    /// Verbs are case-insensitive tokens
    pub fn from_token(token: &str) -> Self {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "USER" => Verb::User,
            "PASS" => Verb::Pass,
            "QUIT" => Verb::Quit,
            "PWD" | "XPWD" => Verb::Pwd,
            "CWD" | "XCWD" => Verb::Cwd,
            "CDUP" | "XCUP" => Verb::Cdup,
            "LIST" => Verb::List,
            "RETR" => Verb::Retr,
            "STOR" => Verb::Stor,
            "DELE" => Verb::Dele,
            "MKD" | "XMKD" => Verb::Mkd,
            "RMD" | "XRMD" => Verb::Rmd,
            "PASV" => Verb::Pasv,
            "PORT" => Verb::Port,
            "TYPE" => Verb::Type,
            "REST" => Verb::Rest,
            "ABOR" => Verb::Abor,
            "NOOP" => Verb::Noop,
            "SYST" => Verb::Syst,
            _ => Verb::Unknown(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verb::User => "USER",
            Verb::Pass => "PASS",
            Verb::Quit => "QUIT",
            Verb::Pwd => "PWD",
            Verb::Cwd => "CWD",
            Verb::Cdup => "CDUP",
            Verb::List => "LIST",
            Verb::Retr => "RETR",
            Verb::Stor => "STOR",
            Verb::Dele => "DELE",
            Verb::Mkd => "MKD",
            Verb::Rmd => "RMD",
            Verb::Pasv => "PASV",
            Verb::Port => "PORT",
            Verb::Type => "TYPE",
            Verb::Rest => "REST",
            Verb::Abor => "ABOR",
            Verb::Noop => "NOOP",
            Verb::Syst => "SYST",
            Verb::Unknown(s) => s,
        }
    }

    /// Verbs that open a data connection
    pub fn is_data_transfer(&self) -> bool {
        matches!(self, Verb::List | Verb::Retr | Verb::Stor)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded command line: a verb and the raw remainder of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub arg: String,
}

impl Command {
    pub fn new(verb: Verb, arg: impl Into<String>) -> Self {
        Self {
            verb,
            arg: arg.into(),
        }
    }

    /// The argument, or `None` when the line carried none
    pub fn argument(&self) -> Option<&str> {
        if self.arg.is_empty() {
            None
        } else {
            Some(&self.arg)
        }
    }

    /// Wire form for the client side: `VERB[ SP arg] CRLF`
    pub fn encode(&self) -> Vec<u8> {
        if self.arg.is_empty() {
            format!("{}\r\n", self.verb).into_bytes()
        } else {
            format!("{} {}\r\n", self.verb, self.arg).into_bytes()
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // PASS arguments never reach the log
        match self.verb {
            Verb::Pass => write!(f, "PASS ****"),
            _ if self.arg.is_empty() => write!(f, "{}", self.verb),
            _ => write!(f, "{} {}", self.verb, self.arg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs_are_case_insensitive() {
        assert_eq!(Verb::from_token("retr"), Verb::Retr);
        assert_eq!(Verb::from_token("ReTr"), Verb::Retr);
        assert_eq!(Verb::from_token("xmkd"), Verb::Mkd);
        assert_eq!(Verb::from_token("feat"), Verb::Unknown("FEAT".into()));
    }

    #[test]
    fn test_display_hides_password() {
        let cmd = Command::new(Verb::Pass, "hunter2");
        assert_eq!(cmd.to_string(), "PASS ****");
        assert_eq!(Command::new(Verb::Cwd, "docs").to_string(), "CWD docs");
    }

    #[test]
    fn test_encode() {
        assert_eq!(Command::new(Verb::Pasv, "").encode(), b"PASV\r\n");
        assert_eq!(
            Command::new(Verb::Stor, "my file.txt").encode(),
            b"STOR my file.txt\r\n"
        );
    }
}
