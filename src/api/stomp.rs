//! Minimal STOMP 1.2 framing for the broker's WebSocket endpoint.
//!
//! Only the client side is covered: we build CONNECT/SUBSCRIBE/UNSUBSCRIBE/DISCONNECT
//! and parse whatever the broker pushes back. One WebSocket text message may hold
//! several frames, and a lone EOL is a heart-beat.

use std::fmt;
use std::str::FromStr;

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    // CONNECT and CONNECTED predate header escaping and must stay raw.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(ChatError::Frame(format!("unknown command {:?}", other))),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Repeated headers: the first one wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(t) = token {
            frame = frame.header("Authorization", format!("Bearer {}", t));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Splits one WebSocket payload into frames, skipping heart-beats. Fails on the first
    /// malformed frame.
    pub fn decode_all(input: &str) -> Result<Vec<Frame>> {
        Self::decode_each(input).into_iter().collect()
    }

    /// Like [`Frame::decode_all`], but a malformed frame only costs itself: decoding resumes
    /// after its NUL terminator.
    pub fn decode_each(input: &str) -> Vec<Result<Frame>> {
        let mut out = Vec::new();
        let mut rest = input;
        loop {
            rest = rest.trim_start_matches(['\n', '\r']);
            if rest.is_empty() {
                break;
            }
            match decode_one(rest) {
                Ok((frame, used)) => {
                    out.push(Ok(frame));
                    rest = &rest[used..];
                }
                Err(e) => {
                    out.push(Err(e));
                    match rest.find('\0') {
                        Some(nul) => rest = &rest[nul + 1..],
                        None => break,
                    }
                }
            }
        }
        out
    }
}

fn decode_one(input: &str) -> Result<(Frame, usize)> {
    // Header lines end in LF or CRLF; the first empty line closes the block.
    let mut head = Vec::new();
    let mut pos = 0;
    loop {
        let nl = input[pos..]
            .find('\n')
            .ok_or_else(|| ChatError::Frame("missing header terminator".into()))?;
        let line = input[pos..pos + nl].trim_end_matches('\r');
        pos += nl + 1;
        if line.is_empty() {
            break;
        }
        head.push(line);
    }
    let body_start = pos;

    let mut lines = head.into_iter();
    let command: Command = lines
        .next()
        .ok_or_else(|| ChatError::Frame("empty frame".into()))?
        .parse()?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines {
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| ChatError::Frame(format!("bad header line {:?}", line)))?;
        if escape {
            headers.push((unescape_header(k)?, unescape_header(v)?));
        } else {
            headers.push((k.to_string(), v.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ChatError::Frame(format!("bad content-length {:?}", v)))
        })
        .transpose()?;

    let tail = &input[body_start..];
    let body_len = match content_length {
        Some(len) => {
            if tail.len() < len || !tail.is_char_boundary(len) || tail.as_bytes().get(len) != Some(&0) {
                return Err(ChatError::Frame("body shorter than content-length".into()));
            }
            len
        }
        None => tail
            .find('\0')
            .ok_or_else(|| ChatError::Frame("missing NUL terminator".into()))?,
    };

    let frame = Frame {
        command,
        headers,
        body: tail[..body_len].to_string(),
    };
    Ok((frame, body_start + body_len + 1))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Frame(format!("undefined escape \\{}", other.unwrap_or(' '))));
            }
        }
    }
    Ok(out)
}
