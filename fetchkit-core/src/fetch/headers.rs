//! Parsing and formatting of the HTTP metadata the fetcher relies on.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

/// RFC 1123 date layout used by `If-Modified-Since` and `Last-Modified`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats `time` as an HTTP date, truncated to whole seconds.
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

/// Parses an HTTP date as sent in `Last-Modified`.
///
/// # Errors
///
/// Returns [`Error::MetadataParse`] for values that are not RFC 1123 dates or
/// that predate the Unix epoch.
pub fn parse_http_date(value: &str) -> Result<SystemTime> {
    let malformed = || Error::MetadataParse {
        header: "Last-Modified",
        value: value.to_string(),
    };

    let parsed = DateTime::parse_from_rfc2822(value.trim()).map_err(|_| malformed())?;
    let secs = u64::try_from(parsed.timestamp()).map_err(|_| malformed())?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Whole seconds since the Unix epoch; times before the epoch clamp to zero.
pub(crate) fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extracts the suggested file name from a `Content-Disposition` value.
///
/// The RFC 5987 `filename*` parameter wins over plain `filename` when both
/// are present. Only the final path component of the suggestion is kept.
///
/// Returns `Ok(None)` when the header carries no file name.
///
/// # Errors
///
/// Returns [`Error::MetadataParse`] for values that cannot be tokenised, or
/// whose file name reduces to nothing usable (`..`, `/`).
pub fn parse_content_disposition(value: &str) -> Result<Option<String>> {
    let malformed = || Error::MetadataParse {
        header: "Content-Disposition",
        value: value.to_string(),
    };

    let mut params = split_params(value).ok_or_else(malformed)?.into_iter();
    let disposition = params.next().unwrap_or_default();
    if disposition.is_empty() || disposition.contains('=') {
        return Err(malformed());
    }

    let mut plain = None;
    let mut extended = None;
    for param in params {
        let (name, raw) = param.split_once('=').ok_or_else(malformed)?;
        match name.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = Some(unquote(raw.trim()).ok_or_else(malformed)?),
            "filename*" => extended = Some(decode_ext_value(raw.trim()).ok_or_else(malformed)?),
            _ => {}
        }
    }

    match extended.or(plain) {
        Some(name) => sanitize_file_name(&name).map(Some).ok_or_else(malformed),
        None => Ok(None),
    }
}

/// Derives a file name from the last path segment of `url`.
///
/// Returns `None` if the path ends in `/` or the decoded segment is not a
/// usable file name.
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    sanitize_file_name(&decoded)
}

/// Reduces a suggested name to its final normal path component.
fn sanitize_file_name(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    match Path::new(&normalized).components().next_back()? {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Splits a header value on `;`, respecting quoted strings.
fn split_params(value: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return None;
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    Some(parts)
}

/// Strips surrounding quotes and backslash escapes from a parameter value.
fn unquote(raw: &str) -> Option<String> {
    let Some(inner) = raw.strip_prefix('"') else {
        return (!raw.is_empty()).then(|| raw.to_string());
    };
    let inner = inner.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Decodes an RFC 5987 `charset'language'value` parameter.
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8(bytes).ok()
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(bytes.into_iter().map(char::from).collect())
    } else {
        None
    }
}

/// Places a hinted file name next to the candidate destination.
pub(crate) fn sibling(candidate: &Path, file_name: &str) -> PathBuf {
    match candidate.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_format() {
        let time = UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        assert_eq!(format_http_date(time), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn test_http_date_truncates_subseconds() {
        let time = UNIX_EPOCH + Duration::from_millis(1_445_412_480_750);
        assert_eq!(format_http_date(time), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(unix_seconds(parsed), 1_445_412_480);
    }

    #[test]
    fn test_parse_http_date_rejects_garbage() {
        let err = parse_http_date("yesterday").unwrap_err();
        assert!(matches!(
            err,
            Error::MetadataParse {
                header: "Last-Modified",
                ..
            }
        ));
    }

    #[test]
    fn test_content_disposition_quoted() {
        let name = parse_content_disposition(r#"attachment; filename="greeting2.txt""#).unwrap();
        assert_eq!(name.as_deref(), Some("greeting2.txt"));
    }

    #[test]
    fn test_content_disposition_token_and_semicolon_in_quotes() {
        assert_eq!(
            parse_content_disposition("attachment; filename=defs.proto")
                .unwrap()
                .as_deref(),
            Some("defs.proto")
        );
        assert_eq!(
            parse_content_disposition(r#"inline; filename="a;b.txt"; size=3"#)
                .unwrap()
                .as_deref(),
            Some("a;b.txt")
        );
    }

    #[test]
    fn test_content_disposition_extended_wins() {
        let value = r#"attachment; filename="plain.txt"; filename*=UTF-8''caf%C3%A9.txt"#;
        assert_eq!(
            parse_content_disposition(value).unwrap().as_deref(),
            Some("café.txt")
        );
    }

    #[test]
    fn test_content_disposition_without_filename() {
        assert_eq!(parse_content_disposition("inline").unwrap(), None);
    }

    #[test]
    fn test_content_disposition_strips_directories() {
        let name = parse_content_disposition(r#"attachment; filename="../../etc/passwd""#).unwrap();
        assert_eq!(name.as_deref(), Some("passwd"));
    }

    #[test]
    fn test_content_disposition_malformed() {
        assert!(parse_content_disposition(r#"attachment; filename="unterminated"#).is_err());
        assert!(parse_content_disposition("filename=x.txt").is_err());
        assert!(parse_content_disposition(r#"attachment; filename="..""#).is_err());
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/defs/greeting.txt?rev=2").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("greeting.txt"));

        let url = Url::parse("https://example.com/my%20file.proto").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("my file.proto"));

        let url = Url::parse("https://example.com/defs/").unwrap();
        assert_eq!(file_name_from_url(&url), None);
    }

    #[test]
    fn test_sibling() {
        assert_eq!(
            sibling(Path::new("out/greeting.txt"), "greeting2.txt"),
            PathBuf::from("out/greeting2.txt")
        );
        assert_eq!(
            sibling(Path::new("greeting.txt"), "greeting2.txt"),
            PathBuf::from("greeting2.txt")
        );
    }
}
