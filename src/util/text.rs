use std::borrow::Cow;

use quick_xml::escape::resolve_html5_entity;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Longest entity name considered between `&` and `;`.
/// The longest HTML5 name (`&CounterClockwiseContourIntegral;`) is 31 chars.
const MAX_ENTITY_LEN: usize = 32;

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Decodes HTML character references in feed text.
///
/// Handles every named HTML5 entity plus decimal (`&#39;`) and hex
/// (`&#x27;`) numeric references. Decoding is lenient: a bare `&`, an
/// unterminated reference or an unknown name is copied through verbatim.
///
/// Returns `Cow::Borrowed` when the input contains no `&`.
///
/// # Examples
///
/// ```
/// use gator::util::decode_html_entities;
///
/// assert_eq!(decode_html_entities("Tom &amp; Jerry"), "Tom & Jerry");
/// assert_eq!(decode_html_entities("it&#8217;s"), "it\u{2019}s");
/// assert_eq!(decode_html_entities("AT&T"), "AT&T");
/// ```
pub fn decode_html_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        let resolved = after
            .find(';')
            .filter(|&end| end > 0 && end <= MAX_ENTITY_LEN)
            .and_then(|end| resolve_reference(&after[..end]).map(|text| (end, text)));

        match resolved {
            Some((end, text)) => {
                out.push_str(&text);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Resolve the text between `&` and `;`.
fn resolve_reference(name: &str) -> Option<Cow<'static, str>> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        // NUL and surrogates map to U+FFFD like browsers do
        let ch = char::from_u32(code)
            .filter(|c| *c != '\0')
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        return Some(Cow::Owned(ch.to_string()));
    }

    resolve_html5_entity(name).map(Cow::Borrowed)
}

/// Truncates a string to fit within `max_width` terminal columns,
/// appending "..." when something was cut.
///
/// Width is measured with `unicode-width`, so CJK and emoji count as two
/// columns. Returns `Cow::Borrowed` when the string already fits.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        return Cow::Owned(take_columns(s, max_width).to_string());
    }

    let mut truncated = take_columns(s, max_width - ELLIPSIS_WIDTH).to_string();
    truncated.push_str(ELLIPSIS);
    Cow::Owned(truncated)
}

/// Longest prefix of `s` that fits in `width` columns
fn take_columns(s: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, ch) in s.char_indices() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            return &s[..idx];
        }
        used += w;
    }
    s
}

/// Removes terminal control characters and ANSI escape sequences.
///
/// Feed text is printed straight to the terminal, and a numeric reference
/// such as `&#x1b;` decodes to a raw ESC. Stripped:
/// - C0 controls other than tab, newline and carriage return, plus DEL
/// - CSI sequences (`ESC [` up to a final byte in `0x40..=0x7E`)
/// - OSC sequences (`ESC ]` up to BEL or `ESC \`)
/// - any other lone ESC
///
/// Returns `Cow::Borrowed` when nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(is_terminal_control) {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x1b => i = skip_escape(bytes, i),
            b if is_terminal_control(b) => i += 1,
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| is_terminal_control(b))
                    .map_or(bytes.len(), |offset| i + offset);
                // Controls are ASCII, so `end` is a char boundary
                out.push_str(&s[i..end]);
                i = end;
            }
        }
    }

    Cow::Owned(out)
}

fn is_terminal_control(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Index just past the escape sequence whose ESC is at `start`
fn skip_escape(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    match bytes.get(i) {
        Some(b'[') => {
            i += 1;
            while let Some(&b) = bytes.get(i) {
                i += 1;
                if (0x40..=0x7e).contains(&b) {
                    break;
                }
            }
        }
        Some(b']') => {
            i += 1;
            while let Some(&b) = bytes.get(i) {
                if b == 0x07 {
                    return i + 1;
                }
                if b == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                    return i + 2;
                }
                i += 1;
            }
        }
        _ => {}
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_ampersand_borrows() {
        assert!(matches!(
            decode_html_entities("plain text"),
            Cow::Borrowed("plain text")
        ));
    }

    #[test]
    fn test_named_entities() {
        assert_eq!(decode_html_entities("a &lt;b&gt; c"), "a <b> c");
        assert_eq!(decode_html_entities("&quot;hi&quot;"), "\"hi\"");
        assert_eq!(decode_html_entities("caf&eacute;"), "café");
        assert_eq!(decode_html_entities("&hellip;&nbsp;"), "\u{2026}\u{a0}");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(decode_html_entities("&#39;"), "'");
        assert_eq!(decode_html_entities("&#x27;&#X27;"), "''");
        assert_eq!(decode_html_entities("&#0;"), "\u{FFFD}");
        assert_eq!(decode_html_entities("&#xD800;"), "\u{FFFD}");
    }

    #[test]
    fn test_lenient_on_garbage() {
        assert_eq!(decode_html_entities("AT&T"), "AT&T");
        assert_eq!(decode_html_entities("a & b; c"), "a & b; c");
        assert_eq!(decode_html_entities("&bogus;"), "&bogus;");
        assert_eq!(decode_html_entities("&;"), "&;");
        assert_eq!(decode_html_entities("trailing &"), "trailing &");
        assert_eq!(decode_html_entities("&#xZZ;"), "&#xZZ;");
    }

    #[test]
    fn test_single_pass_only() {
        // Double-escaped input decodes one level
        assert_eq!(decode_html_entities("&amp;amp;"), "&amp;");
    }

    #[test]
    fn test_unknown_then_known() {
        assert_eq!(decode_html_entities("&amp &lt;"), "&amp <");
    }

    #[test]
    fn test_truncate_fits() {
        assert!(matches!(truncate_to_width("Short", 10), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_to_width("Hello, World!", 8), "Hello...");
    }

    #[test]
    fn test_truncate_wide_chars() {
        // Each CJK char is two columns; 7 columns leaves room for 2 chars + "..."
        assert_eq!(truncate_to_width("日本語テキスト", 7), "日本...");
    }

    #[test]
    fn test_truncate_narrow() {
        assert_eq!(truncate_to_width("Hello", 2), "He");
        assert_eq!(truncate_to_width("Hello", 0), "");
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(s in ".{0,64}") {
            let _ = decode_html_entities(&s);
        }

        #[test]
        fn prop_decode_identity_without_ampersand(s in "[^&]{0,64}") {
            prop_assert_eq!(decode_html_entities(&s), s.as_str());
        }

        #[test]
        fn prop_truncate_respects_width(s in "[a-zA-Z0-9 .,éü日本語テ]{0,64}", width in 0usize..40) {
            let out = truncate_to_width(&s, width);
            prop_assert!(UnicodeWidthStr::width(out.as_ref()) <= width);
        }
    }

    #[test]
    fn test_strip_clean_text_borrows() {
        let input = "line1\nline2\ttabbed\r\nend";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(s) if s == input));
    }

    #[test]
    fn test_strip_c0_and_del() {
        assert_eq!(strip_control_chars("a\x00b\x07c\x08d\x7fe"), "abcde");
    }

    #[test]
    fn test_strip_csi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(strip_control_chars("before\x1b[2Jafter"), "beforeafter");
    }

    #[test]
    fn test_strip_osc_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;title\x07text"), "text");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\text"), "text");
        // unterminated OSC swallows the rest
        assert_eq!(strip_control_chars("ok\x1b]0;never ends"), "ok");
    }

    #[test]
    fn test_strip_lone_esc_keeps_unicode() {
        assert_eq!(strip_control_chars("日本\x1b語"), "日本語");
        assert_eq!(strip_control_chars("\x1b[1m太字\x1b[0m"), "太字");
    }

    #[test]
    fn test_decoded_escape_is_stripped() {
        let decoded = decode_html_entities("Hi &#x1b;[2J&#x1b;]0;pwned&#7;!");
        assert_eq!(strip_control_chars(&decoded), "Hi !");
    }
}
