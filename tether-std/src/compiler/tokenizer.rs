//! Lenient HTML tokenizer for server-rendered fragments.
//!
//! Tag names are ASCII `[A-Za-z0-9:_-]`. Attribute names run until
//! whitespace, `/`, `>`, `=` or a quote, so framework attributes such as
//! `@click` or `x-on:click.outside` survive. Both keep their source spelling;
//! case folding is left to the tree builder. `script` and `style` bodies are
//! rawtext, `textarea` and `title` bodies are escapable rawtext. Unterminated
//! constructs end the stream instead of failing.

use memchr::memchr;

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const SCRIPT_CLOSE_TAG: &[u8] = b"</script";
const STYLE_CLOSE_TAG: &[u8] = b"</style";
const TEXTAREA_CLOSE_TAG: &[u8] = b"</textarea";
const TITLE_CLOSE_TAG: &[u8] = b"</title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Doctype,
    Comment,
    Text(String),
    StartTag {
        /// Lower-cased.
        name: String,
        /// As written.
        raw_name: String,
        attributes: Vec<(String, Option<String>)>,
        self_closing: bool,
    },
    EndTag(String),
}

static VOID_ELEMENTS: phf::Set<&'static str> = phf::phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
};

pub(crate) fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(name)
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

fn is_attribute_name_char(c: u8) -> bool {
    !c.is_ascii_whitespace() && !matches!(c, b'/' | b'>' | b'=' | b'"' | b'\'')
}

/// Close tag of elements whose body is not markup, and whether entities are
/// decoded inside it.
fn text_only_close_tag(name: &str) -> Option<(&'static [u8], bool)> {
    match name {
        "script" => Some((SCRIPT_CLOSE_TAG, false)),
        "style" => Some((STYLE_CLOSE_TAG, false)),
        "textarea" => Some((TEXTAREA_CLOSE_TAG, true)),
        "title" => Some((TITLE_CLOSE_TAG, true)),
        _ => None,
    }
}

fn starts_with_ignore_case(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack
        .get(start..start + needle.len())
        .is_some_and(|slice| slice.eq_ignore_ascii_case(needle))
}

/// Find a close tag such as `</script` followed by optional whitespace and `>`.
/// Returns the byte range of the close tag.
fn find_rawtext_close(haystack: &str, close_tag: &[u8]) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let mut i = 0;
    while i + close_tag.len() <= bytes.len() {
        i += memchr(b'<', &bytes[i..])?;
        if starts_with_ignore_case(bytes, i, close_tag) {
            let mut k = i + close_tag.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && bytes[k] == b'>' {
                return Some((i, k + 1));
            }
        }
        i += 1;
    }
    None
}

pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;
    // Slices are only cut at ASCII structural bytes, so every endpoint is a
    // char boundary.
    while i < len {
        if bytes[i] != b'<' {
            let start = i;
            i = memchr(b'<', &bytes[i..]).map_or(len, |rel| i + rel);
            out.push(Token::Text(decode_entities(&input[start..i])));
            continue;
        }

        if input[i..].starts_with(COMMENT_START) {
            let body = i + COMMENT_START.len();
            match input[body..].find(COMMENT_END) {
                Some(end) => {
                    out.push(Token::Comment);
                    i = body + end + COMMENT_END.len();
                    continue;
                }
                None => break,
            }
        }

        if starts_with_ignore_case(bytes, i, b"<!doctype") {
            match input[i..].find('>') {
                Some(end) => {
                    out.push(Token::Doctype);
                    i += end + 1;
                    continue;
                }
                None => break,
            }
        }

        if i + 1 < len && bytes[i + 1] == b'/' {
            let start = i + 2;
            let mut j = start;
            while j < len && is_name_char(bytes[j]) {
                j += 1;
            }
            let name = input[start..j].to_ascii_lowercase();
            i = memchr(b'>', &bytes[j..]).map_or(len, |rel| j + rel + 1);
            if !name.is_empty() {
                out.push(Token::EndTag(name));
            }
            continue;
        }

        let start = i + 1;
        let mut k = start;
        while k < len && is_name_char(bytes[k]) {
            k += 1;
        }
        if k == start {
            // A bare `<` is text.
            out.push(Token::Text("<".to_string()));
            i += 1;
            continue;
        }
        let raw_name = &input[start..k];
        let name = raw_name.to_ascii_lowercase();
        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k >= len {
                break;
            }
            if bytes[k] == b'>' {
                k += 1;
                break;
            }
            if bytes[k] == b'/' {
                if k + 1 < len && bytes[k + 1] == b'>' {
                    self_closing = true;
                    k += 2;
                    break;
                }
                k += 1;
                continue;
            }
            let name_start = k;
            while k < len && is_attribute_name_char(bytes[k]) {
                k += 1;
            }
            if name_start == k {
                // A stray `=` or quote.
                k += 1;
                continue;
            }
            let attribute = input[name_start..k].to_string();
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            let value = if k < len && bytes[k] == b'=' {
                k += 1;
                while k < len && bytes[k].is_ascii_whitespace() {
                    k += 1;
                }
                if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                    let quote = bytes[k];
                    k += 1;
                    let value_start = k;
                    k = memchr(quote, &bytes[k..]).map_or(len, |rel| k + rel);
                    let raw = &input[value_start..k];
                    if k < len {
                        k += 1;
                    }
                    Some(decode_entities(raw))
                } else {
                    let value_start = k;
                    while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                        k += 1;
                    }
                    Some(decode_entities(&input[value_start..k]))
                }
            } else {
                None
            };
            attributes.push((attribute, value));
        }

        if is_void_element(&name) {
            self_closing = true;
        }
        let text_only = if self_closing {
            None
        } else {
            text_only_close_tag(&name)
        };
        out.push(Token::StartTag {
            name: name.clone(),
            raw_name: raw_name.to_string(),
            attributes,
            self_closing,
        });

        if let Some((close_tag, escapable)) = text_only {
            let (body_end, next) = find_rawtext_close(&input[k..], close_tag)
                .map_or((len, len), |(start, end)| (k + start, k + end));
            if body_end > k {
                let body = &input[k..body_end];
                out.push(Token::Text(if escapable {
                    decode_entities(body)
                } else {
                    body.to_string()
                }));
            }
            out.push(Token::EndTag(name));
            i = next;
            continue;
        }
        i = k;
    }
    out
}

/// Decode the named entities markup generators emit plus numeric
/// references. Anything else passes through unchanged.
pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.bytes().take(12).position(|b| b == b';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity.strip_prefix('#').and_then(|digits| {
                let code = match digits.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => digits.parse().ok(),
                };
                code.and_then(char::from_u32)
            }),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str, attributes: &[(&str, Option<&str>)], self_closing: bool) -> Token {
        spelled(name, name, attributes, self_closing)
    }

    fn spelled(
        name: &str,
        raw_name: &str,
        attributes: &[(&str, Option<&str>)],
        self_closing: bool,
    ) -> Token {
        Token::StartTag {
            name: name.to_string(),
            raw_name: raw_name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
            self_closing,
        }
    }

    #[test]
    fn test_attributes_and_quotes() {
        let tokens = tokenize(r#"<INPUT Type=checkbox checked value='a "b"'>"#);
        assert_eq!(tokens, vec![spelled(
            "input",
            "INPUT",
            &[
                ("Type", Some("checkbox")),
                ("checked", None),
                ("value", Some(r#"a "b""#)),
            ],
            true
        )]);
    }

    #[test]
    fn test_entities_in_text_and_attributes() {
        let tokens = tokenize("<p title='it&#39;s'>a &lt;b&gt; &amp; &copy;</p>");
        assert_eq!(tokens[0], start("p", &[("title", Some("it's"))], false));
        assert_eq!(tokens[1], Token::Text("a <b> & &copy;".into()));
        assert_eq!(tokens[2], Token::EndTag("p".into()));
    }

    #[test]
    fn test_script_is_rawtext() {
        let tokens = tokenize("<script>if (a < b) { x('</p>') }</script ><p>");
        assert_eq!(tokens[1], Token::Text("if (a < b) { x('</p>') }".into()));
        assert_eq!(tokens[2], Token::EndTag("script".into()));
        assert_eq!(tokens[3], start("p", &[], false));
    }

    #[test]
    fn test_attribute_names_keep_punctuation_and_case() {
        let tokens = tokenize(
            r#"<svg viewBox="0 0 8 8" x-on:click.outside="close()" @click='a()' :class=c #ref data-x=1 />"#,
        );
        assert_eq!(tokens, vec![start(
            "svg",
            &[
                ("viewBox", Some("0 0 8 8")),
                ("x-on:click.outside", Some("close()")),
                ("@click", Some("a()")),
                (":class", Some("c")),
                ("#ref", None),
                ("data-x", Some("1")),
            ],
            true
        )]);
    }

    #[test]
    fn test_stray_attribute_punctuation_is_skipped() {
        let tokens = tokenize(r#"<p = "x" a=1>"#);
        assert_eq!(tokens, vec![start("p", &[("x", None), ("a", Some("1"))], false)]);
    }

    #[test]
    fn test_textarea_and_title_are_escapable_rawtext() {
        let tokens = tokenize("<textarea><b>&lt;hi&gt;</b></textarea><title>a<i>b</i> &amp;</title>");
        assert_eq!(tokens[1], Token::Text("<b><hi></b>".into()));
        assert_eq!(tokens[2], Token::EndTag("textarea".into()));
        assert_eq!(tokens[4], Token::Text("a<i>b</i> &".into()));
        assert_eq!(tokens[5], Token::EndTag("title".into()));
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_unterminated_constructs() {
        assert_eq!(tokenize("<!-- open"), vec![]);
        assert_eq!(tokenize("<div"), vec![start("div", &[], false)]);
        assert_eq!(tokenize("a < b"), vec![
            Token::Text("a ".into()),
            Token::Text("<".into()),
            Token::Text(" b".into()),
        ]);
    }

    #[test]
    fn test_utf8_text() {
        assert_eq!(tokenize("<b>120×32</b>")[1], Token::Text("120×32".into()));
    }
}
