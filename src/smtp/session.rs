//! Line-level SMTP session state machine.
//!
//! The session owns no sockets: the server feeds it one received line at a
//! time and acts on the returned [`Event`]. This keeps the command grammar
//! and transaction sequencing testable without any I/O.

use std::net::SocketAddr;

use crate::relay::Envelope;

/// Transaction size limit, in bytes of message data.
pub const DEFAULT_MAX_SIZE: usize = 33_554_432;

/// What the server should do after feeding one line to the session.
#[derive(Debug)]
pub enum Event {
    /// Nothing to write, keep reading.
    Continue,
    /// Write a reply and keep the session open. Multiline replies carry
    /// embedded CRLFs.
    Reply(String),
    /// A transaction completed. Run the handler, then reply `250 OK` on
    /// success or `451` on failure.
    Submit { envelope: Envelope, data: Vec<u8> },
    /// Write a final reply and close the connection.
    Close(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Command,
    Data,
}

/// One SMTP connection's state.
pub struct Session {
    hostname: String,
    peer: SocketAddr,
    max_size: usize,
    greeted: bool,
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
    phase: Phase,
    data: Vec<u8>,
    data_oversize: bool,
}

impl Session {
    pub fn new(hostname: impl Into<String>, peer: SocketAddr) -> Session {
        Session {
            hostname: hostname.into(),
            peer,
            max_size: DEFAULT_MAX_SIZE,
            greeted: false,
            mail_from: None,
            rcpt_to: Vec::new(),
            phase: Phase::Command,
            data: Vec::new(),
            data_oversize: false,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Session {
        self.max_size = max_size;
        self
    }

    /// Banner to send as soon as the connection opens.
    pub fn greeting(&self) -> String {
        format!(
            "220 {} {} {}",
            self.hostname,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
    }

    /// Feeds one received line, including its terminator if present.
    pub fn feed_line(&mut self, line: &[u8]) -> Event {
        match self.phase {
            Phase::Command => self.feed_command(line),
            Phase::Data => self.feed_data(line),
        }
    }

    // ── command phase ───────────────────────────────────────────

    fn feed_command(&mut self, line: &[u8]) -> Event {
        let line = String::from_utf8_lossy(strip_line_ending(line)).into_owned();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Event::Reply("500 Error: bad syntax".into());
        }
        let (verb, arg) = match trimmed.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg.trim())),
            None => (trimmed, None),
        };
        let verb = verb.to_ascii_uppercase();
        match verb.as_str() {
            "HELO" => self.cmd_helo(arg),
            "EHLO" => self.cmd_ehlo(arg),
            "MAIL" => self.cmd_mail(arg),
            "RCPT" => self.cmd_rcpt(arg),
            "DATA" => self.cmd_data(arg),
            "RSET" => self.cmd_rset(arg),
            "NOOP" => self.cmd_noop(arg),
            "QUIT" => self.cmd_quit(arg),
            _ => Event::Reply(format!("500 Error: command \"{verb}\" not recognized")),
        }
    }

    fn cmd_helo(&mut self, arg: Option<&str>) -> Event {
        if arg.is_none_or(str::is_empty) {
            return Event::Reply("501 Syntax: HELO hostname".into());
        }
        // A repeated greeting resets any transaction in progress.
        self.reset_transaction();
        self.greeted = true;
        Event::Reply(format!("250 {}", self.hostname))
    }

    fn cmd_ehlo(&mut self, arg: Option<&str>) -> Event {
        if arg.is_none_or(str::is_empty) {
            return Event::Reply("501 Syntax: EHLO hostname".into());
        }
        self.reset_transaction();
        self.greeted = true;
        Event::Reply(format!(
            "250-{}\r\n250 SIZE {}",
            self.hostname, self.max_size
        ))
    }

    fn cmd_mail(&mut self, arg: Option<&str>) -> Event {
        if !self.greeted {
            return Event::Reply("503 Error: send HELO first".into());
        }
        let syntax = "501 Syntax: MAIL FROM: <address>";
        let Some(rest) = arg.and_then(|arg| strip_keyword(arg, "FROM:")) else {
            return Event::Reply(syntax.into());
        };
        // The null reverse path <> is a valid sender.
        let Some(address) = parse_address(rest) else {
            return Event::Reply(syntax.into());
        };
        if self.mail_from.is_some() {
            return Event::Reply("503 Error: nested MAIL command".into());
        }
        self.mail_from = Some(address);
        Event::Reply("250 OK".into())
    }

    fn cmd_rcpt(&mut self, arg: Option<&str>) -> Event {
        if !self.greeted {
            return Event::Reply("503 Error: send HELO first".into());
        }
        if self.mail_from.is_none() {
            return Event::Reply("503 Error: need MAIL command".into());
        }
        let syntax = "501 Syntax: RCPT TO: <address>";
        let Some(rest) = arg.and_then(|arg| strip_keyword(arg, "TO:")) else {
            return Event::Reply(syntax.into());
        };
        match parse_address(rest) {
            Some(address) if !address.is_empty() => {
                self.rcpt_to.push(address);
                Event::Reply("250 OK".into())
            }
            _ => Event::Reply(syntax.into()),
        }
    }

    fn cmd_data(&mut self, arg: Option<&str>) -> Event {
        if !self.greeted {
            return Event::Reply("503 Error: send HELO first".into());
        }
        if self.rcpt_to.is_empty() {
            return Event::Reply("503 Error: need RCPT command".into());
        }
        if arg.is_some() {
            return Event::Reply("501 Syntax: DATA".into());
        }
        self.phase = Phase::Data;
        Event::Reply("354 End data with <CR><LF>.<CR><LF>".into())
    }

    fn cmd_rset(&mut self, arg: Option<&str>) -> Event {
        if arg.is_some_and(|arg| !arg.is_empty()) {
            return Event::Reply("501 Syntax: RSET".into());
        }
        self.reset_transaction();
        Event::Reply("250 OK".into())
    }

    fn cmd_noop(&mut self, arg: Option<&str>) -> Event {
        if arg.is_some_and(|arg| !arg.is_empty()) {
            return Event::Reply("501 Syntax: NOOP".into());
        }
        Event::Reply("250 OK".into())
    }

    fn cmd_quit(&mut self, arg: Option<&str>) -> Event {
        if arg.is_some_and(|arg| !arg.is_empty()) {
            return Event::Reply("501 Syntax: QUIT".into());
        }
        Event::Close("221 Bye".into())
    }

    fn reset_transaction(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
        self.data.clear();
        self.data_oversize = false;
    }

    // ── data phase ──────────────────────────────────────────────

    fn feed_data(&mut self, line: &[u8]) -> Event {
        let stripped = strip_line_ending(line);
        if stripped == b"." {
            return self.finish_data();
        }
        // Un-stuff the leading dot, keeping the original line ending.
        let unstuffed = if stripped.starts_with(b".") {
            &line[1..]
        } else {
            line
        };
        if !self.data_oversize {
            if self.data.len() + unstuffed.len() > self.max_size {
                self.data_oversize = true;
            } else {
                self.data.extend_from_slice(unstuffed);
            }
        }
        Event::Continue
    }

    fn finish_data(&mut self) -> Event {
        self.phase = Phase::Command;
        let data = std::mem::take(&mut self.data);
        let oversize = std::mem::take(&mut self.data_oversize);
        let mail_from = self.mail_from.take().unwrap_or_default();
        let rcpt_to = std::mem::take(&mut self.rcpt_to);
        if oversize {
            return Event::Reply("552 Error: Too much mail data".into());
        }
        Event::Submit {
            envelope: Envelope {
                peer: self.peer,
                mail_from,
                rcpt_to,
            },
            data,
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Case-insensitive strip of a command keyword such as `FROM:`.
fn strip_keyword<'a>(arg: &'a str, keyword: &str) -> Option<&'a str> {
    let head = arg.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| arg[keyword.len()..].trim())
}

/// Extracts the address token, dropping angle brackets and trailing ESMTP
/// parameters. `<>` yields an empty address.
fn parse_address(rest: &str) -> Option<String> {
    let token = rest.split_whitespace().next()?;
    let address = token
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(token);
    Some(address.to_string())
}
