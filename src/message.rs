//! Parsed message representation: ordered root headers and the MIME part tree.

use mail_parser::{MessageParser, MimeHeaders, PartType};

/// Ordered set of message headers.
///
/// Lookup is case-insensitive and returns the first match; iteration
/// preserves the original order with duplicates retained, which is what the
/// header dump needs.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Scans the header block of a raw RFC 5322 message. Folded values are
    /// unfolded into a single line. Scanning stops at the first blank line.
    pub fn scan(raw: &[u8]) -> HeaderMap {
        let head = String::from_utf8_lossy(&raw[..header_block_end(raw)]);
        let mut entries: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of the previous header value.
                if let Some((_, value)) = entries.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                entries.push((name.trim_end().to_string(), value.trim().to_string()));
            }
        }
        HeaderMap { entries }
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All entries in original order, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A node in the MIME tree: a container of sub-parts or a leaf carrying
/// payload bytes.
#[derive(Debug, Clone)]
pub enum MessagePart {
    Container(Vec<MessagePart>),
    Leaf(LeafPart),
}

/// A leaf part with its decoded payload and the metadata its own headers
/// declared, if any.
#[derive(Debug, Clone, Default)]
pub struct LeafPart {
    /// Declared `type/subtype` from the part's Content-Type header.
    pub media_type: Option<String>,
    /// Filename the part declared for itself (disposition filename or
    /// content-type name).
    pub file_name: Option<String>,
    /// Decoded payload bytes.
    pub data: Vec<u8>,
}

impl MessagePart {
    /// Depth-first, left-to-right sequence of leaf parts. The result always
    /// has one entry per leaf in the tree, regardless of nesting.
    pub fn leaves(&self) -> Vec<&LeafPart> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafPart>) {
        match self {
            MessagePart::Container(parts) => {
                for part in parts {
                    part.collect_leaves(out);
                }
            }
            MessagePart::Leaf(leaf) => out.push(leaf),
        }
    }
}

/// A complete inbound message: the scanned root headers, the decoded MIME
/// tree and the raw bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct ParsedMail {
    pub headers: HeaderMap,
    pub root: MessagePart,
    pub raw: Vec<u8>,
}

impl ParsedMail {
    /// Parses raw message bytes. Returns `None` when the bytes cannot be
    /// interpreted as a message at all.
    pub fn parse(raw: Vec<u8>) -> Option<ParsedMail> {
        let root = {
            let message = MessageParser::default().parse(&raw[..])?;
            convert_part(&message, 0)?
        };
        let headers = HeaderMap::scan(&raw);
        Some(ParsedMail { headers, root, raw })
    }
}

fn convert_part(
    message: &mail_parser::Message<'_>,
    id: mail_parser::MessagePartId,
) -> Option<MessagePart> {
    let part = message.parts.get(id as usize)?;
    let converted = match &part.body {
        PartType::Multipart(children) => MessagePart::Container(
            children
                .iter()
                .filter_map(|&child| convert_part(message, child))
                .collect(),
        ),
        // An attached message is a container with the inner root as its
        // single child, so its leaves flatten like any other subtree.
        PartType::Message(nested) => {
            MessagePart::Container(convert_part(nested, 0).into_iter().collect())
        }
        PartType::Text(text) => MessagePart::Leaf(leaf_from(part, text.as_bytes().to_vec())),
        PartType::Html(html) => MessagePart::Leaf(leaf_from(part, html.as_bytes().to_vec())),
        PartType::Binary(data) | PartType::InlineBinary(data) => {
            MessagePart::Leaf(leaf_from(part, data.to_vec()))
        }
    };
    Some(converted)
}

fn leaf_from(part: &mail_parser::MessagePart<'_>, data: Vec<u8>) -> LeafPart {
    let media_type = part.content_type().map(|ct| match ct.subtype() {
        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
        None => ct.ctype().to_string(),
    });
    let file_name = part
        .attachment_name()
        .filter(|name| !name.is_empty())
        .map(String::from);
    LeafPart {
        media_type,
        file_name,
        data,
    }
}

/// Appends `X-Peer`, `X-MailFrom` and `X-RcptTo` trace headers at the end of
/// the raw message's header block, so the parsed tree, the header dump and
/// the attached raw copy all observe the envelope data.
pub fn stamp_trace_headers(raw: &[u8], peer: &str, mail_from: &str, rcpt_to: &[String]) -> Vec<u8> {
    let trace = format!(
        "X-Peer: {peer}\r\nX-MailFrom: {mail_from}\r\nX-RcptTo: {}\r\n",
        rcpt_to.join(", ")
    );
    let insert_at = header_block_end(raw);
    let mut stamped = Vec::with_capacity(raw.len() + trace.len());
    stamped.extend_from_slice(&raw[..insert_at]);
    stamped.extend_from_slice(trace.as_bytes());
    stamped.extend_from_slice(&raw[insert_at..]);
    stamped
}

/// Offset of the blank line separating headers from the body, or the end of
/// input when the message has no body.
fn header_block_end(raw: &[u8]) -> usize {
    let mut at = 0;
    while at < raw.len() {
        match raw[at..].iter().position(|&b| b == b'\n') {
            Some(nl) => {
                let mut line = &raw[at..at + nl];
                if line.last() == Some(&b'\r') {
                    line = &line[..line.len() - 1];
                }
                if line.is_empty() {
                    return at;
                }
                at += nl + 1;
            }
            None => return raw.len(),
        }
    }
    raw.len()
}
