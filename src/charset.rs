//! Charset-name to server-charset-id mapping.
//!
//! The configured charset must resolve here before a connection is
//! constructed; the resolved id is sent in the handshake response.

/// Default charset when the options carry none.
pub const DEFAULT_CHARSET: &str = "utf8";

/// Resolve a charset name to its MySQL collation/charset id.
///
/// Names are matched case-insensitively with `-` and `_` stripped, so
/// `UTF-8`, `utf_8` and `utf8` all resolve to 33.
pub fn charset_id(name: &str) -> Option<u8> {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    Some(match normalized.as_str() {
        "big5" => 1,
        "dec8" => 3,
        "cp850" => 4,
        "hp8" => 6,
        "koi8r" => 7,
        "latin1" => 8,
        "latin2" => 9,
        "swe7" => 10,
        "ascii" => 11,
        "ujis" => 12,
        "sjis" => 13,
        "hebrew" => 16,
        "tis620" => 18,
        "euckr" => 19,
        "koi8u" => 22,
        "gb2312" => 24,
        "greek" => 25,
        "cp1250" => 26,
        "gbk" => 28,
        "latin5" => 30,
        "armscii8" => 32,
        "utf8" => 33,
        "ucs2" => 35,
        "cp866" => 36,
        "keybcs2" => 37,
        "macce" => 38,
        "macroman" => 39,
        "cp852" => 40,
        "latin7" => 41,
        "utf8mb4" => 45,
        "cp1251" => 51,
        "utf16" => 54,
        "utf16le" => 56,
        "cp1256" => 57,
        "cp1257" => 59,
        "utf32" => 60,
        "binary" => 63,
        "geostd8" => 92,
        "cp932" => 95,
        "eucjpms" => 97,
        "gb18030" => 248,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::charset_id;

    #[test]
    fn resolves_common_charsets() {
        assert_eq!(charset_id("utf8"), Some(33));
        assert_eq!(charset_id("utf8mb4"), Some(45));
        assert_eq!(charset_id("latin1"), Some(8));
        assert_eq!(charset_id("binary"), Some(63));
    }

    #[test]
    fn normalizes_separators_and_case() {
        assert_eq!(charset_id("UTF-8"), Some(33));
        assert_eq!(charset_id("UTF8MB4"), Some(45));
        assert_eq!(charset_id("utf_8"), Some(33));
    }

    #[test]
    fn rejects_unknown() {
        assert_eq!(charset_id("klingon"), None);
        assert_eq!(charset_id(""), None);
    }
}
