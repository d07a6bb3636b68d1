//! Body selection and assembly of the ordered webhook payload.

use crate::message::HeaderMap;
use crate::relay::resolve::ResolvedAttachment;

/// Platform limit for the visible message body, in characters.
pub const BODY_LIMIT: usize = 2000;

const HEADERS_FILENAME: &str = "headers.txt";
const ORIGINAL_FILENAME: &str = "message.eml";
const ORIGINAL_MEDIA_TYPE: &str = "multipart/rfc822";

/// One named field of the outgoing multipart payload.
#[derive(Debug, Clone)]
pub struct PayloadPart {
    /// Multipart field name: `content`, `username` or `files[i]`.
    pub name: String,
    pub data: Vec<u8>,
    /// Filename, carried by file fields only.
    pub file_name: Option<String>,
    pub media_type: Option<String>,
}

impl PayloadPart {
    fn text(name: &str, value: &str) -> PayloadPart {
        PayloadPart {
            name: name.to_string(),
            data: value.as_bytes().to_vec(),
            file_name: None,
            media_type: None,
        }
    }

    fn content(value: String, media_type: &str) -> PayloadPart {
        PayloadPart {
            name: "content".to_string(),
            data: value.into_bytes(),
            file_name: None,
            media_type: Some(media_type.to_string()),
        }
    }

    fn file(index: usize, filename: &str, media_type: &str, data: Vec<u8>) -> PayloadPart {
        PayloadPart {
            name: format!("files[{index}]"),
            data,
            file_name: Some(filename.to_string()),
            media_type: Some(media_type.to_string()),
        }
    }
}

/// The assembled payload, parts in send order: content, file attachments in
/// flattened order, username, then the optional extras.
#[derive(Debug, Clone, Default)]
pub struct WebhookPayload {
    pub parts: Vec<PayloadPart>,
}

impl WebhookPayload {
    /// Field names in send order.
    pub fn names(&self) -> Vec<&str> {
        self.parts.iter().map(|part| part.name.as_str()).collect()
    }
}

/// Assembles the payload for one message.
///
/// The first leaf without an explicit filename becomes the visible body,
/// decorated with the subject and truncated to [`BODY_LIMIT`] characters
/// (the full text then travels as a file under the leaf's own index). Every
/// other leaf is attached under `files[<flattened index>]`. The optional
/// header dump and raw-message copy take the next unused indices.
pub fn build_payload(
    headers: &HeaderMap,
    attachments: &[ResolvedAttachment],
    raw: &[u8],
    send_headers: bool,
    attach_original: bool,
) -> WebhookPayload {
    let mut content: Option<PayloadPart> = None;
    let mut files: Vec<PayloadPart> = Vec::new();

    for attachment in attachments {
        if content.is_none() && !attachment.has_explicit_name {
            let (body, overflow) = select_body(headers.get("Subject"), attachment);
            content = Some(body);
            files.extend(overflow);
        } else {
            files.push(PayloadPart::file(
                attachment.index,
                &attachment.filename,
                &attachment.media_type,
                attachment.payload.clone(),
            ));
        }
    }

    let mut parts: Vec<PayloadPart> = content.into_iter().chain(files).collect();

    // X-MailFrom is stamped from the envelope by intake and outranks the
    // message's own From header.
    let username = headers.get("X-MailFrom").or_else(|| headers.get("From"));
    if let Some(username) = username.filter(|value| !value.is_empty()) {
        parts.push(PayloadPart::text("username", username));
    }

    let mut next_index = attachments.len();
    if send_headers {
        parts.push(PayloadPart::file(
            next_index,
            HEADERS_FILENAME,
            "text/plain",
            dump_headers(headers).into_bytes(),
        ));
        next_index += 1;
    }
    if attach_original {
        parts.push(PayloadPart::file(
            next_index,
            ORIGINAL_FILENAME,
            ORIGINAL_MEDIA_TYPE,
            raw.to_vec(),
        ));
    }

    WebhookPayload { parts }
}

/// Decorates and, when needed, truncates the body candidate. Returns the
/// `content` part plus the overflow file when the decorated text does not
/// fit the platform limit.
fn select_body(
    subject: Option<&str>,
    candidate: &ResolvedAttachment,
) -> (PayloadPart, Option<PayloadPart>) {
    let text = String::from_utf8_lossy(&candidate.payload);
    let decorated = match subject.filter(|subject| !subject.is_empty()) {
        Some(subject) => format!("# {subject}\r\n{text}"),
        None => text.into_owned(),
    };

    // Limits are measured in characters, not bytes.
    if decorated.chars().count() <= BODY_LIMIT {
        return (PayloadPart::content(decorated, &candidate.media_type), None);
    }

    let marker = format!("\nMessage Body Overflow into {}", candidate.filename);
    let keep = BODY_LIMIT.saturating_sub(marker.chars().count());
    let mut truncated: String = decorated.chars().take(keep).collect();
    truncated.push_str(&marker);

    let overflow = PayloadPart::file(
        candidate.index,
        &candidate.filename,
        &candidate.media_type,
        decorated.into_bytes(),
    );
    (
        PayloadPart::content(truncated, &candidate.media_type),
        Some(overflow),
    )
}

/// Serializes every root header, one entry per line in original order, keys
/// padded to the widest key so values align.
fn dump_headers(headers: &HeaderMap) -> String {
    let width = headers
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);
    headers
        .iter()
        .map(|(name, value)| format!("{name:<width$} {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &str) -> HeaderMap {
        HeaderMap::scan(raw.as_bytes())
    }

    fn synthesized(index: usize, payload: &str) -> ResolvedAttachment {
        ResolvedAttachment {
            index,
            media_type: "text/plain".to_string(),
            filename: format!("File_{index}.txt"),
            has_explicit_name: false,
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn explicit(index: usize, filename: &str, media_type: &str) -> ResolvedAttachment {
        ResolvedAttachment {
            index,
            media_type: media_type.to_string(),
            filename: filename.to_string(),
            has_explicit_name: true,
            payload: b"bytes".to_vec(),
        }
    }

    fn part_text(part: &PayloadPart) -> String {
        String::from_utf8(part.data.clone()).unwrap()
    }

    // ── body selection ──────────────────────────────────────────

    #[test]
    fn subject_prefixes_the_body() {
        let payload = build_payload(
            &headers("Subject: Test\r\n\r\n"),
            &[synthesized(0, "Hello")],
            b"",
            false,
            false,
        );
        assert_eq!(payload.names(), vec!["content"]);
        assert_eq!(part_text(&payload.parts[0]), "# Test\r\nHello");
        assert_eq!(payload.parts[0].media_type.as_deref(), Some("text/plain"));
        assert_eq!(payload.parts[0].file_name, None);
    }

    #[test]
    fn missing_subject_leaves_body_bare() {
        let payload = build_payload(
            &headers("Date: now\r\n\r\n"),
            &[synthesized(0, "Hello")],
            b"",
            false,
            false,
        );
        assert_eq!(part_text(&payload.parts[0]), "Hello");
    }

    #[test]
    fn first_synthesized_leaf_becomes_body_the_rest_attach() {
        let payload = build_payload(
            &headers("From: alice@example.com\r\n\r\n"),
            &[
                explicit(0, "report.pdf", "application/pdf"),
                synthesized(1, "the body"),
                synthesized(2, "an afterthought"),
            ],
            b"",
            false,
            false,
        );
        assert_eq!(
            payload.names(),
            vec!["content", "files[0]", "files[2]", "username"]
        );
        assert_eq!(part_text(&payload.parts[0]), "the body");
        assert_eq!(payload.parts[1].file_name.as_deref(), Some("report.pdf"));
        assert_eq!(part_text(&payload.parts[2]), "an afterthought");
    }

    #[test]
    fn explicit_only_message_has_no_content_field() {
        let payload = build_payload(
            &headers("\r\n"),
            &[explicit(0, "report.pdf", "application/pdf")],
            b"",
            false,
            false,
        );
        assert_eq!(payload.names(), vec!["files[0]"]);
    }

    // ── truncation ──────────────────────────────────────────────

    #[test]
    fn long_body_is_truncated_and_diverted_to_a_file() {
        let body = "x".repeat(2500);
        let payload = build_payload(
            &headers("Subject: Long\r\n\r\n"),
            &[synthesized(0, &body)],
            b"",
            false,
            false,
        );
        assert_eq!(payload.names(), vec!["content", "files[0]"]);

        let marker = "\nMessage Body Overflow into File_0.txt";
        let content = part_text(&payload.parts[0]);
        assert_eq!(content.chars().count(), BODY_LIMIT);
        assert!(content.ends_with(marker));
        assert!(content.starts_with("# Long\r\nxxx"));

        let full = part_text(&payload.parts[1]);
        assert_eq!(full, format!("# Long\r\n{body}"));
        assert_eq!(payload.parts[1].file_name.as_deref(), Some("File_0.txt"));

        let keep: String = full
            .chars()
            .take(BODY_LIMIT - marker.chars().count())
            .collect();
        assert_eq!(content, format!("{keep}{marker}"));
    }

    #[test]
    fn body_exactly_at_the_limit_is_kept_whole() {
        let body = "y".repeat(BODY_LIMIT);
        let payload = build_payload(&headers("\r\n"), &[synthesized(0, &body)], b"", false, false);
        assert_eq!(payload.names(), vec!["content"]);
        assert_eq!(part_text(&payload.parts[0]), body);
    }

    #[test]
    fn subject_counts_against_the_body_limit() {
        // 1995 body chars fit alone but not with the subject heading.
        let body = "z".repeat(1995);
        let payload = build_payload(
            &headers("Subject: S\r\n\r\n"),
            &[synthesized(0, &body)],
            b"",
            false,
            false,
        );
        assert_eq!(payload.names(), vec!["content", "files[0]"]);
        assert_eq!(part_text(&payload.parts[0]).chars().count(), BODY_LIMIT);
    }

    // ── username ────────────────────────────────────────────────

    #[test]
    fn username_prefers_stamped_sender_over_from() {
        let payload = build_payload(
            &headers("From: alice@example.com\r\nX-MailFrom: env@example.com\r\n\r\n"),
            &[synthesized(0, "hi")],
            b"",
            false,
            false,
        );
        assert_eq!(part_text(&payload.parts[1]), "env@example.com");
        assert_eq!(payload.parts[1].name, "username");
        assert_eq!(payload.parts[1].media_type, None);
    }

    #[test]
    fn username_falls_back_to_from_header() {
        let payload = build_payload(
            &headers("From: alice@example.com\r\n\r\n"),
            &[synthesized(0, "hi")],
            b"",
            false,
            false,
        );
        assert_eq!(part_text(&payload.parts[1]), "alice@example.com");
    }

    #[test]
    fn username_is_omitted_when_no_sender_is_known() {
        let payload = build_payload(&headers("\r\n"), &[synthesized(0, "hi")], b"", false, false);
        assert_eq!(payload.names(), vec!["content"]);
    }

    #[test]
    fn empty_stamped_sender_suppresses_username() {
        // A null reverse path stamps an empty X-MailFrom; the field is
        // dropped rather than falling back to From.
        let payload = build_payload(
            &headers("X-MailFrom:\r\nFrom: alice@example.com\r\n\r\n"),
            &[synthesized(0, "hi")],
            b"",
            false,
            false,
        );
        assert_eq!(payload.names(), vec!["content"]);
    }

    // ── extras ──────────────────────────────────────────────────

    #[test]
    fn header_dump_pads_keys_and_keeps_duplicates() {
        let payload = build_payload(
            &headers("From: alice@example.com\r\nX-Longer-Key: v\r\nFrom: dup@example.com\r\n\r\n"),
            &[synthesized(0, "hi")],
            b"",
            true,
            false,
        );
        let dump = payload
            .parts
            .iter()
            .find(|part| part.name == "files[1]")
            .unwrap();
        assert_eq!(dump.file_name.as_deref(), Some("headers.txt"));
        assert_eq!(dump.media_type.as_deref(), Some("text/plain"));
        assert_eq!(
            part_text(dump),
            "From         alice@example.com\n\
             X-Longer-Key v\n\
             From         dup@example.com"
        );
    }

    #[test]
    fn empty_header_set_dumps_an_empty_file() {
        let payload = build_payload(&headers(""), &[synthesized(0, "hi")], b"", true, false);
        let dump = payload
            .parts
            .iter()
            .find(|part| part.name == "files[1]")
            .unwrap();
        assert!(dump.data.is_empty());
    }

    #[test]
    fn attached_original_takes_the_last_index() {
        let payload = build_payload(
            &headers("From: a@b\r\n\r\n"),
            &[synthesized(0, "hi")],
            b"raw message bytes",
            true,
            true,
        );
        assert_eq!(
            payload.names(),
            vec!["content", "username", "files[1]", "files[2]"]
        );
        let original = &payload.parts[3];
        assert_eq!(original.file_name.as_deref(), Some("message.eml"));
        assert_eq!(original.media_type.as_deref(), Some("multipart/rfc822"));
        assert_eq!(original.data, b"raw message bytes");
    }

    #[test]
    fn extras_close_ranks_when_header_dump_is_off() {
        let payload = build_payload(
            &headers("\r\n"),
            &[synthesized(0, "hi")],
            b"raw",
            false,
            true,
        );
        assert_eq!(payload.names(), vec!["content", "files[1]"]);
        assert_eq!(
            payload.parts[1].file_name.as_deref(),
            Some("message.eml")
        );
    }
}
