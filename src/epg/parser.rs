//! XMLTV document parser
//!
//! Builds an owned [`XmlNode`] tree from raw guide bytes. Parsing happens in
//! two steps: the bytes are first decoded strictly in the document's own
//! encoding and read as-is; if that fails they are decoded lossily, scrubbed
//! of characters XML 1.0 forbids and of bare ampersands, and read again.
//! Callers can tell which step produced the tree.

use encoding_rs::{Encoding, UTF_8};
use quick_xml::encoding::{detect_encoding, Decoder};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;

use super::node::{XmlContent, XmlNode};
use crate::errors::{DocumentError, XmlError};

/// Which parse step produced a document
#[derive(Debug, Clone, PartialEq)]
pub enum ParseRoute {
    /// Raw bytes were well-formed
    Strict,
    /// Raw bytes were rejected for `strict`; decoded text parsed fine
    Lossy { strict: XmlError },
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub root: XmlNode,
    pub route: ParseRoute,
}

/// Parse a guide, falling back to lossy decoding when the raw bytes are rejected
pub fn parse_document(bytes: &[u8]) -> Result<ParsedDocument, DocumentError> {
    let strict = match parse_tree(bytes) {
        Ok(root) => {
            return Ok(ParsedDocument {
                root,
                route: ParseRoute::Strict,
            })
        }
        Err(e) => e,
    };

    let text = sanitize(&decode_lossy(bytes));
    match parse_text(&text) {
        Ok(root) => Ok(ParsedDocument {
            root,
            route: ParseRoute::Lossy { strict },
        }),
        Err(lossy) => Err(DocumentError { strict, lossy }),
    }
}

/// Parse well-formed XML into its root element
pub fn parse_tree(bytes: &[u8]) -> Result<XmlNode, XmlError> {
    let text = decode_strict(bytes)?;
    parse_text(&text)
}

/// Encoding of a document plus the length of its byte order mark.
///
/// A BOM or a UTF-16 byte layout decides first. Otherwise the `encoding` of
/// the XML declaration is used when it is an ASCII-compatible one, and UTF-8
/// when there is none.
fn document_encoding(bytes: &[u8]) -> (&'static Encoding, usize) {
    match detect_encoding(bytes) {
        Some((encoding, bom)) if bom > 0 || encoding != UTF_8 => (encoding, bom),
        Some(_) => (declared_encoding(bytes).unwrap_or(UTF_8), 0),
        None => (UTF_8, 0),
    }
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let mut reader = Reader::from_reader(bytes);
    match reader.read_event() {
        Ok(Event::Decl(decl)) => decl
            .encoder()
            .filter(|encoding| encoding.is_ascii_compatible()),
        _ => None,
    }
}

fn decode_strict(bytes: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    let (encoding, bom) = document_encoding(bytes);
    let body = &bytes[bom..];

    if encoding == UTF_8 {
        return std::str::from_utf8(body).map(Cow::Borrowed).map_err(|e| {
            XmlError::new((bom + e.valid_up_to()) as u64, format!("invalid UTF-8: {}", e))
        });
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| XmlError::new(bom as u64, format!("malformed {} byte sequence", encoding.name())))
}

fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    let (encoding, bom) = document_encoding(bytes);
    let (text, _had_errors) = encoding.decode_without_bom_handling(&bytes[bom..]);
    text
}

fn parse_text(text: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(text);
    let decoder = reader.decoder();

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let position = reader.buffer_position();
        match reader
            .read_event()
            .map_err(|e| XmlError::new(position, e.to_string()))?
        {
            Event::Start(ref e) => {
                let node = open_element(decoder, e, position)?;
                check_root_slot(&root, &stack, position)?;
                stack.push(node);
            }
            Event::Empty(ref e) => {
                let node = open_element(decoder, e, position)?;
                check_root_slot(&root, &stack, position)?;
                close_element(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::new(position, "end tag without matching start tag"))?;
                close_element(&mut stack, &mut root, node);
            }
            Event::Text(ref e) => {
                let text = e.xml10_content().map_err(|err| XmlError::new(position, err.to_string()))?;
                if text.contains('&') {
                    return Err(XmlError::new(position, "bare '&' in character data"));
                }
                check_chars(&text, position)?;
                append_text(&mut stack, &text, position)?;
            }
            Event::CData(ref e) => {
                let text = e.xml10_content().map_err(|err| XmlError::new(position, err.to_string()))?;
                check_chars(&text, position)?;
                append_text(&mut stack, &text, position)?;
            }
            Event::GeneralRef(ref e) => {
                let name = decode(decoder, e, position)?;
                let resolved = resolve_reference(&name)
                    .ok_or_else(|| XmlError::new(position, format!("unknown entity &{};", name)))?;
                let mut utf8 = [0u8; 4];
                append_text(&mut stack, resolved.encode_utf8(&mut utf8), position)?;
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype
            _ => {}
        }
    }

    let end = reader.buffer_position();
    if let Some(open) = stack.last() {
        return Err(XmlError::new(end, format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError::new(end, "document has no root element"))
}

fn open_element(decoder: Decoder, e: &BytesStart, position: u64) -> Result<XmlNode, XmlError> {
    let name = decode(decoder, e.name().as_ref(), position)?.into_owned();
    let mut node = XmlNode::new(name);

    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::new(position, err.to_string()))?;
        let key = decode(decoder, attr.key.as_ref(), position)?.into_owned();
        let raw = decode(decoder, attr.value.as_ref(), position)?;
        check_chars(&raw, position)?;
        let value = unescape(&raw).map_err(|msg| XmlError::new(position, msg))?;
        node.attributes.push((key, value));
    }

    Ok(node)
}

fn check_root_slot(root: &Option<XmlNode>, stack: &[XmlNode], position: u64) -> Result<(), XmlError> {
    if stack.is_empty() && root.is_some() {
        return Err(XmlError::new(position, "more than one root element"));
    }
    Ok(())
}

fn close_element(stack: &mut [XmlNode], root: &mut Option<XmlNode>, mut node: XmlNode) {
    node.strip_layout_whitespace();

    match stack.last_mut() {
        Some(parent) => parent.content.push(XmlContent::Element(node)),
        None => *root = Some(node),
    }
}

fn append_text(stack: &mut [XmlNode], text: &str, position: u64) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(node) => {
            node.push_text(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::new(position, "text outside the root element")),
    }
}

fn decode<'b>(decoder: Decoder, bytes: &'b [u8], position: u64) -> Result<Cow<'b, str>, XmlError> {
    decoder
        .decode(bytes)
        .map_err(|e| XmlError::new(position, e.to_string()))
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{d7ff}' | '\u{e000}'..='\u{fffd}' | '\u{10000}'..='\u{10ffff}')
}

fn check_chars(text: &str, position: u64) -> Result<(), XmlError> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(XmlError::new(position, format!("illegal character U+{:04X}", c as u32))),
        None => Ok(()),
    }
}

/// Resolve the name between `&` and `;` to a character
fn resolve_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Expand entity references inside an attribute value
fn unescape(raw: &str) -> Result<String, String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| format!("unterminated entity in attribute value {:?}", raw))?;
        let name = &after[..semi];
        let c = resolve_reference(name).ok_or_else(|| format!("unknown entity &{};", name))?;
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Make decoded text palatable to the XML reader.
///
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF].
/// Illegal characters become spaces and an `&` that does not open an entity
/// reference is escaped.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 32);

    for (i, c) in text.char_indices() {
        match c {
            '\u{7f}' => out.push(' '),
            _ if !is_xml_char(c) => out.push(' '),
            '&' if !is_valid_entity_start(&text.as_bytes()[i..]) => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }

    out
}

/// Check if bytes starting with & look like a valid XML entity
fn is_valid_entity_start(bytes: &[u8]) -> bool {
    if bytes.len() < 2 {
        return false;
    }

    // Numeric entity &#...; or &#x...;
    if bytes[1] == b'#' {
        let digits = &bytes[2..];
        let (digits, hex) = match digits.first() {
            Some(b'x') | Some(b'X') => (&digits[1..], true),
            _ => (digits, false),
        };
        let len = digits
            .iter()
            .take_while(|b| if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
            .count();
        return len > 0 && digits.get(len) == Some(&b';');
    }

    // Named entity &name; within a short distance
    let mut end = 1;
    while end < bytes.len() && end < 10 {
        match bytes[end] {
            b';' => return end > 1,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
            _ => return false,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_text(root: &XmlNode, path: &[&str]) -> String {
        let mut node = root;
        for name in path {
            node = node.child(name).unwrap();
        }
        node.text()
    }

    fn utf16le(text: &str) -> Vec<u8> {
        let mut out = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_parse_simple_epg() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="upstream">
  <channel id="bbc1">
    <display-name>BBC One</display-name>
    <icon src="http://example.com/bbc1.png"/>
  </channel>
  <!-- schedule -->
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="bbc1">
    <title>News at Noon</title>
    <desc>Daily news broadcast</desc>
  </programme>
</tv>"#;

        let doc = parse_document(xml).unwrap();
        assert_eq!(doc.route, ParseRoute::Strict);

        let root = doc.root;
        assert_eq!(root.name, "tv");
        assert_eq!(root.attribute("generator-info-name"), Some("upstream"));
        assert!(!root.has_text());
        let children: Vec<&XmlNode> = root.elements().collect();
        assert_eq!(children.len(), 2);

        let channel = children[0];
        assert_eq!(channel.attribute("id"), Some("bbc1"));
        assert_eq!(channel.content.len(), 2);
        assert_eq!(first_text(channel, &["display-name"]), "BBC One");
        assert_eq!(channel.child("icon").unwrap().attribute("src"), Some("http://example.com/bbc1.png"));

        let programme = children[1];
        assert_eq!(programme.attribute("start"), Some("20240115120000 +0000"));
        assert_eq!(first_text(programme, &["title"]), "News at Noon");
    }

    #[test]
    fn test_entities_in_text_and_attributes() {
        let xml = br#"<tv><channel id="a&amp;b"><display-name>Tom &amp; Jerry &#x263A; &#65;</display-name></channel></tv>"#;
        let root = parse_tree(xml).unwrap();
        let channel = root.child("channel").unwrap();
        assert_eq!(channel.attribute("id"), Some("a&b"));
        assert_eq!(first_text(channel, &["display-name"]), "Tom & Jerry \u{263A} A");
    }

    #[test]
    fn test_cdata_text() {
        let root = parse_tree(b"<tv><desc><![CDATA[a < b]]></desc></tv>").unwrap();
        assert_eq!(first_text(&root, &["desc"]), "a < b");
    }

    #[test]
    fn test_text_kept_verbatim() {
        let xml = b"<tv><programme channel=\"a\"><desc>  Line one\n\n  Line two  </desc></programme></tv>";
        let root = parse_tree(xml).unwrap();
        assert_eq!(first_text(&root, &["programme", "desc"]), "  Line one\n\n  Line two  ");
    }

    #[test]
    fn test_mixed_content_order_preserved() {
        let root = parse_tree(b"<tv><desc>head <b>x</b> tail</desc></tv>").unwrap();
        let desc = root.child("desc").unwrap();
        assert_eq!(
            desc.content,
            vec![
                XmlContent::Text("head ".to_string()),
                XmlContent::Element(XmlNode::new("b").with_text("x")),
                XmlContent::Text(" tail".to_string()),
            ]
        );
    }

    #[test]
    fn test_declared_latin1_decoded_strictly() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><tv><channel id=\"a\"><display-name>Caf\xe9</display-name></channel></tv>";
        let doc = parse_document(xml).unwrap();
        assert_eq!(doc.route, ParseRoute::Strict);
        assert_eq!(first_text(&doc.root, &["channel", "display-name"]), "Caf\u{e9}");
    }

    #[test]
    fn test_declared_gbk_decoded_strictly() {
        // "中央" in GBK
        let xml = b"<?xml version='1.0' encoding='GBK'?><tv><title>\xd6\xd0\xd1\xeb</title></tv>";
        let doc = parse_document(xml).unwrap();
        assert_eq!(doc.route, ParseRoute::Strict);
        assert_eq!(first_text(&doc.root, &["title"]), "\u{4e2d}\u{592e}");
    }

    #[test]
    fn test_utf16_with_bom() {
        let xml = utf16le(
            "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n<tv><channel id=\"a\"><display-name>Caf\u{e9} \u{4e2d}</display-name></channel></tv>",
        );
        let doc = parse_document(&xml).unwrap();
        assert_eq!(doc.route, ParseRoute::Strict);
        let channel = doc.root.child("channel").unwrap();
        assert_eq!(channel.attribute("id"), Some("a"));
        assert_eq!(first_text(channel, &["display-name"]), "Caf\u{e9} \u{4e2d}");
    }

    #[test]
    fn test_utf8_bom_skipped() {
        let mut xml = vec![0xEF, 0xBB, 0xBF];
        xml.extend_from_slice("<tv><title>\u{e9}t\u{e9}</title></tv>".as_bytes());
        let root = parse_tree(&xml).unwrap();
        assert_eq!(first_text(&root, &["title"]), "\u{e9}t\u{e9}");
    }

    #[test]
    fn test_invalid_utf8_falls_back_to_lossy() {
        let xml = b"<tv><channel id=\"a\"><display-name>Caf\xe9</display-name></channel></tv>";
        let doc = parse_document(xml).unwrap();
        assert!(matches!(doc.route, ParseRoute::Lossy { .. }));
        assert_eq!(first_text(&doc.root, &["channel", "display-name"]), "Caf\u{FFFD}");
    }

    #[test]
    fn test_bare_ampersand_falls_back_to_lossy() {
        let xml = b"<tv><programme channel=\"a\"><title>Q&A</title></programme></tv>";
        assert!(parse_tree(xml).is_err());

        let doc = parse_document(xml).unwrap();
        match doc.route {
            ParseRoute::Lossy { strict } => assert!(!strict.message.is_empty()),
            ParseRoute::Strict => panic!("expected lossy route"),
        }
        assert_eq!(first_text(&doc.root, &["programme", "title"]), "Q&A");
    }

    #[test]
    fn test_control_characters_scrubbed() {
        let xml = b"<tv><title>bad\x01char</title></tv>";
        let doc = parse_document(xml).unwrap();
        assert_eq!(first_text(&doc.root, &["title"]), "bad char");
    }

    #[test]
    fn test_both_steps_fail() {
        let err = parse_document(b"<tv><channel id=\"a\"></tv>").unwrap_err();
        assert!(!err.strict.message.is_empty());
        assert!(!err.lossy.message.is_empty());

        assert!(parse_document(b"this is not xml").is_err());
        assert!(parse_document(b"").is_err());
    }

    #[test]
    fn test_unclosed_root() {
        let err = parse_tree(b"<tv><channel id=\"a\"/>").unwrap_err();
        assert!(err.message.contains("tv"));
    }

    #[test]
    fn test_two_roots_rejected() {
        assert!(parse_tree(b"<tv/><tv/>").is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a & b"), "a &amp; b");
        assert_eq!(sanitize("a &amp; b"), "a &amp; b");
        assert_eq!(sanitize("&#169; &#xA9; &#;"), "&#169; &#xA9; &amp;#;");
        assert_eq!(sanitize("tab\tnl\nbell\u{7}"), "tab\tnl\nbell ");
    }

    #[test]
    fn test_resolve_reference() {
        assert_eq!(resolve_reference("amp"), Some('&'));
        assert_eq!(resolve_reference("#x41"), Some('A'));
        assert_eq!(resolve_reference("#66"), Some('B'));
        assert_eq!(resolve_reference("bogus"), None);
    }
}
