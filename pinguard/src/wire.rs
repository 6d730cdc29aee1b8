//! Percent escaping for the line protocol.
//!
//! Inbound `SETDESC`/`SETPROMPT` text arrives `%XX`-escaped; outbound secret
//! data must be escaped so a `D` line never carries a raw `%`, CR, LF, or a
//! byte outside printable ASCII.

/// Decode `%XX` sequences (two hex digits) to their byte value.  Any other
/// `%` sequence passes through literally.
pub fn unescape(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_val),
                bytes.get(i + 2).copied().and_then(hex_val),
            ) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-encode a secret byte-by-byte: `%`, CR, LF, and anything outside
/// printable ASCII (32–126) become `%` plus two uppercase hex digits.
pub fn escape_secret(secret: &[u8]) -> String {
    let mut out = String::with_capacity(secret.len());
    for &b in secret {
        if b == b'%' || b == b'\n' || b == b'\r' || !(32..=126).contains(&b) {
            out.push('%');
            out.push(char::from(HEX_UPPER[(b >> 4) as usize]));
            out.push(char::from(HEX_UPPER[(b & 0x0F) as usize]));
        } else {
            out.push(char::from(b));
        }
    }
    out
}

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_decodes_hex_pairs() {
        assert_eq!(unescape("authenticate%20please"), "authenticate please");
        assert_eq!(unescape("a%25b"), "a%b");
        assert_eq!(unescape("%0Aline"), "\nline");
        assert_eq!(unescape("%2f%2F"), "//");
    }

    #[test]
    fn unescape_passes_invalid_sequences_through() {
        assert_eq!(unescape("100%"), "100%");
        assert_eq!(unescape("%zz"), "%zz");
        assert_eq!(unescape("%2"), "%2");
        assert_eq!(unescape("50%% done"), "50%% done");
    }

    #[test]
    fn unescape_leaves_plain_text_alone() {
        assert_eq!(unescape("no escapes here"), "no escapes here");
        assert_eq!(unescape(""), "");
    }

    #[test]
    fn escape_covers_reserved_and_nonprintable_bytes() {
        assert_eq!(escape_secret(b"pass%word"), "pass%25word");
        assert_eq!(escape_secret(b"a\nb\rc"), "a%0Ab%0Dc");
        assert_eq!(escape_secret(&[0x00, 0x1F, 0x7F]), "%00%1F%7F");
        assert_eq!(escape_secret(&[0xC3, 0xA9]), "%C3%A9");
    }

    #[test]
    fn escape_leaves_printable_ascii_alone() {
        assert_eq!(escape_secret(b"hunter2 !~"), "hunter2 !~");
    }

    #[test]
    fn escaped_output_contains_no_raw_reserved_bytes() {
        let mut secret = Vec::new();
        for b in 0u8..=255 {
            secret.push(b);
        }
        let escaped = escape_secret(&secret);
        for b in escaped.bytes() {
            assert!((32..=126).contains(&b), "raw byte {b:#04x} leaked");
        }
        // '%' only ever introduces an escape.
        let bytes = escaped.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if b == b'%' {
                assert!(bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit());
            }
        }
    }

    #[test]
    fn unescape_inverts_escape_for_printable_ascii() {
        let printable: String = (32u8..=126).map(char::from).collect();
        assert_eq!(unescape(&escape_secret(printable.as_bytes())), printable);
    }
}
