//! Input sanitization and validation for waitlist submissions.
//!
//! Everything here is pure and deterministic: no I/O, no panics, and no
//! errors thrown across the boundary. Invalid input comes back as a tagged
//! [`FieldValidation`] with a user-facing reason string.

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 100;

/// A character repeated this many times in a row marks the name as spam.
pub const SUSPICIOUS_RUN_LEN: usize = 6;

/// Disposable-email providers rejected outright.
pub const SPAM_DOMAINS: [&str; 16] = [
    "tempmail.com",
    "guerrillamail.com",
    "mailinator.com",
    "sharklasers.com",
    "dispostable.com",
    "youmailbo.com",
    "fake-email.com",
    "spamgourmet.com",
    "yopmail.com",
    "deadaddress.com",
    "10minutemail.com",
    "throwawaymail.com",
    "tempmail.net",
    "trashmail.com",
    "spambog.com",
    "fakeinbox.com",
];

pub const REASON_EMAIL_REQUIRED: &str = "Email is required";
pub const REASON_EMAIL_FORMAT: &str = "Invalid email format";
pub const REASON_EMAIL_TEMPORARY: &str = "Please use a non-temporary email address";
pub const REASON_NAME_REQUIRED: &str = "Name is required";
pub const REASON_NAME_TOO_SHORT: &str = "Name is too short";
pub const REASON_NAME_TOO_LONG: &str = "Name is too long";
pub const REASON_NAME_REPETITION: &str = "Name contains suspicious character repetition";

/// Outcome of validating a single form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValidation {
    pub valid: bool,
    pub reason: Option<&'static str>,
}

impl FieldValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Strips `<script>...</script>` blocks and HTML-element-like substrings,
/// then trims surrounding whitespace. A `<script>` without its closing tag
/// loses only the tag itself; a lone `<` that does not open a tag is kept
/// verbatim.
pub fn sanitize_input(input: &str) -> String {
    let without_scripts = strip_script_blocks(input);
    strip_tags(&without_scripts).trim().to_string()
}

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";

fn strip_script_blocks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        let Some(open) = find_script_open(rest) else {
            out.push_str(rest);
            break;
        };
        let after_open = &rest[open + SCRIPT_OPEN.len()..];
        let Some(close) = find_ignore_case(after_open, SCRIPT_CLOSE) else {
            // No closing tag: keep the text, the element stripper still
            // removes the bare opening tag
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open]);
        rest = &after_open[close + SCRIPT_CLOSE.len()..];
    }
    out
}

/// Finds `<script` at a word boundary, so `<scripture>` is left to the
/// plain element stripper.
fn find_script_open(haystack: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = find_ignore_case(&haystack[from..], SCRIPT_OPEN) {
        let idx = from + pos;
        let next = haystack.as_bytes().get(idx + SCRIPT_OPEN.len());
        if next.is_none_or(|b| !b.is_ascii_alphanumeric()) {
            return Some(idx);
        }
        from = idx + 1;
    }
    None
}

fn strip_tags(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if let Some(end) = tag_end(bytes, i) {
                i = end + 1;
                continue;
            }
        }
        // Byte-wise copy is safe: '<' never starts a multi-byte sequence
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Returns the index of the closing '>' when `bytes[start..]` looks like an
/// HTML element: `<`, optional `/`, optional whitespace, an alphanumeric tag
/// name, then anything up to `>`.
fn tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if i < bytes.len() && bytes[i] == b'/' {
        i += 1;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || !bytes[i].is_ascii_alphanumeric() {
        return None;
    }
    bytes[i..].iter().position(|b| *b == b'>').map(|gt| i + gt)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b < 0xE0 => 2,
        b if b < 0xF0 => 3,
        _ => 4,
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    debug_assert!(needle.is_ascii(), "needle must be ASCII");
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| {
        haystack[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

/// Validates email format and rejects known disposable-email domains.
pub fn validate_email(email: &str) -> FieldValidation {
    if email.trim().is_empty() {
        return FieldValidation::fail(REASON_EMAIL_REQUIRED);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return FieldValidation::fail(REASON_EMAIL_FORMAT);
    };
    if !is_valid_local_part(local) || !is_valid_domain(domain) {
        return FieldValidation::fail(REASON_EMAIL_FORMAT);
    }

    let domain_lower = domain.to_ascii_lowercase();
    if SPAM_DOMAINS.contains(&domain_lower.as_str()) {
        return FieldValidation::fail(REASON_EMAIL_TEMPORARY);
    }

    FieldValidation::ok()
}

fn is_valid_local_part(local: &str) -> bool {
    !local.is_empty()
        && local
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'%' | b'+' | b'-'))
}

/// Domain must be `name.tld` with the final label alphabetic and at least
/// two characters long.
fn is_valid_domain(domain: &str) -> bool {
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-'))
    {
        return false;
    }
    let Some((name, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !name.is_empty() && tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Validates the name field: length bounds plus a heuristic spam filter
/// rejecting long runs of a single character.
pub fn validate_name(name: &str) -> FieldValidation {
    if name.trim().is_empty() {
        return FieldValidation::fail(REASON_NAME_REQUIRED);
    }

    let chars = name.chars().count();
    if chars < MIN_NAME_CHARS {
        return FieldValidation::fail(REASON_NAME_TOO_SHORT);
    }
    if chars > MAX_NAME_CHARS {
        return FieldValidation::fail(REASON_NAME_TOO_LONG);
    }
    if has_suspicious_run(name) {
        return FieldValidation::fail(REASON_NAME_REPETITION);
    }

    FieldValidation::ok()
}

fn has_suspicious_run(value: &str) -> bool {
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for ch in value.chars() {
        if prev == Some(ch) {
            run += 1;
            if run >= SUSPICIOUS_RUN_LEN {
                return true;
            }
        } else {
            prev = Some(ch);
            run = 1;
        }
    }
    false
}

/// Honeypot check: the hidden `website` field is invisible to humans, so
/// any non-whitespace value marks the submission as automated.
pub fn is_bot(honeypot_value: Option<&str>) -> bool {
    honeypot_value.is_some_and(|value| !value.trim().is_empty())
}
