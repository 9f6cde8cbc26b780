//! M3U playlist scanning
//!
//! Only the `tvg-id` attributes matter here: they decide which guide channels
//! survive. The playlist is treated as plain text, so entries split across
//! lines or surrounded by junk are still picked up.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Set of channel identifiers taken from one playlist
pub type ValidIds = HashSet<String>;

fn tvg_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"tvg-id="([^"]+)""#).expect("static regex"))
}

/// Collect every distinct `tvg-id="..."` value from raw playlist bytes.
///
/// Invalid UTF-8 is replaced rather than rejected. Empty input gives an empty set.
pub fn extract_tvg_ids(content: &[u8]) -> ValidIds {
    let text = String::from_utf8_lossy(content);
    tvg_id_pattern()
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// EPG URL advertised in the `#EXTM3U` header (`x-tvg-url` or `url-tvg`), if any
pub fn header_epg_url(content: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(content);
    let first_line = text.lines().next()?;
    if !first_line.starts_with("#EXTM3U") {
        return None;
    }
    extract_header_attr(first_line, "x-tvg-url")
        .or_else(|| extract_header_attr(first_line, "url-tvg"))
}

/// Extract attribute from #EXTM3U header line
fn extract_header_attr(line: &str, attr_name: &str) -> Option<String> {
    let search = format!("{}=\"", attr_name);
    let start = line.to_ascii_lowercase().find(&search)?;
    let rest = &line[start + search.len()..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ids() {
        let content = br#"#EXTM3U
#EXTINF:-1 tvg-id="cnn" group-title="News",CNN
http://example.com/live/user/pass/1.ts
#EXTINF:-1 tvg-id="bbc" group-title="News",BBC
http://example.com/live/user/pass/2.ts
"#;
        let ids = extract_tvg_ids(content);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("cnn"));
        assert!(ids.contains("bbc"));
    }

    #[test]
    fn test_duplicates_collapse_regardless_of_order() {
        let a = extract_tvg_ids(br#"tvg-id="x" tvg-id="y" tvg-id="x" tvg-id="z" tvg-id="y""#);
        let b = extract_tvg_ids(br#"tvg-id="z" tvg-id="y" tvg-id="x""#);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_tvg_ids(b"").is_empty());
        assert!(extract_tvg_ids(b"#EXTM3U\n#EXTINF:-1,No ids here\nhttp://x/1.ts\n").is_empty());
    }

    #[test]
    fn test_empty_value_is_skipped() {
        let ids = extract_tvg_ids(br#"#EXTINF:-1 tvg-id="" tvg-name="Nameless",Nameless"#);
        assert!(ids.is_empty());
    }

    #[test]
    fn test_ids_found_without_line_structure() {
        let ids = extract_tvg_ids(br#"garbage tvg-id="a.cn"more garbage,tvg-id="b.cn""#);
        assert!(ids.contains("a.cn"));
        assert!(ids.contains("b.cn"));
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut content = b"#EXTINF:-1 tvg-id=\"good\",Ch\xff\xfe\n".to_vec();
        content.extend_from_slice(b"#EXTINF:-1 tvg-id=\"also\xc3good\",Ch\n");
        let ids = extract_tvg_ids(&content);
        assert!(ids.contains("good"));
        assert!(ids.contains("also\u{FFFD}good"));
    }

    #[test]
    fn test_values_kept_verbatim() {
        let ids = extract_tvg_ids(br#"tvg-id="CCTV1 " tvg-id="cctv1""#);
        assert!(ids.contains("CCTV1 "));
        assert!(ids.contains("cctv1"));
        assert!(!ids.contains("CCTV1"));
    }

    #[test]
    fn test_header_epg_url() {
        let content = br#"#EXTM3U x-tvg-url="http://example.com/epg.xml"
#EXTINF:-1 tvg-id="ch1",Channel 1
http://example.com/1.ts
"#;
        assert_eq!(header_epg_url(content), Some("http://example.com/epg.xml".to_string()));
        assert_eq!(
            header_epg_url(br#"#EXTM3U url-tvg="http://e.com/g.xml.gz""#),
            Some("http://e.com/g.xml.gz".to_string())
        );
        assert_eq!(header_epg_url(b"#EXTINF:-1,x\n"), None);
    }
}
