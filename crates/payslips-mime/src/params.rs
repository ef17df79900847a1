//! Header parameter lists (`; key=value; key2="quoted"`).
//!
//! Handles quoted strings with backslash escapes and RFC 2231 extended
//! parameters (`name*=charset'lang'%XX`, `name*0=...; name*1=...`).

use std::collections::{BTreeMap, HashMap};

use crate::encoding::{decode_charset, percent_decode};
use crate::error::Result;

/// Splits a structured header value into its leading value and the
/// parameter list that follows the first unquoted `;`.
pub(crate) fn split_value(value: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut escaped = false;
    for (index, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return (value[..index].trim(), &value[index + 1..]),
            _ => {}
        }
    }
    (value.trim(), "")
}

/// One `name=value` pair as written, before RFC 2231 reassembly.
struct RawParam {
    name: String,
    section: Option<u32>,
    extended: bool,
    value: String,
}

/// Parses a parameter list into lower-cased names and decoded values.
///
/// Malformed entries are skipped. Duplicate names keep the first value.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownCharset`] if an extended value names an
/// unsupported charset.
pub(crate) fn parse_parameters(input: &str) -> Result<HashMap<String, String>> {
    let mut parameters = HashMap::new();
    let mut sectioned: BTreeMap<String, BTreeMap<u32, (bool, String)>> = BTreeMap::new();

    for raw in scan(input) {
        if raw.section.is_none() && !raw.extended {
            parameters.entry(raw.name).or_insert(raw.value);
        } else {
            sectioned
                .entry(raw.name)
                .or_default()
                .entry(raw.section.unwrap_or(0))
                .or_insert((raw.extended, raw.value));
        }
    }

    for (name, sections) in sectioned {
        let value = reassemble(&sections)?;
        // An extended value wins over a plain one of the same name
        parameters.insert(name, value);
    }

    Ok(parameters)
}

/// Joins continuation sections `0, 1, 2, ...` and decodes extended ones.
fn reassemble(sections: &BTreeMap<u32, (bool, String)>) -> Result<String> {
    let mut charset: Option<String> = None;
    let mut bytes = Vec::new();

    for (expected, (&index, (extended, value))) in (0..).zip(sections) {
        if index != expected {
            break;
        }
        if !*extended {
            bytes.extend_from_slice(value.as_bytes());
            continue;
        }
        let mut encoded = value.as_str();
        if index == 0 {
            let mut fields = value.splitn(3, '\'');
            if let (Some(label), Some(_language), Some(rest)) =
                (fields.next(), fields.next(), fields.next())
            {
                if !label.is_empty() {
                    charset = Some(label.to_string());
                }
                encoded = rest;
            }
        }
        bytes.extend(percent_decode(encoded));
    }

    match charset {
        Some(label) => decode_charset(&label, &bytes),
        None => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn scan(input: &str) -> Vec<RawParam> {
    let mut params = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let Some(name_end) = rest.find(['=', ';']) else {
            break;
        };
        if !rest[name_end..].starts_with('=') {
            rest = &rest[name_end..];
            continue;
        }
        let name = rest[..name_end].trim().to_ascii_lowercase();
        rest = rest[name_end + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let (value, consumed) = read_quoted(quoted);
            rest = &quoted[consumed..];
            // Anything between the closing quote and the next `;` is junk
            rest = rest.find(';').map_or("", |i| &rest[i..]);
            value
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        if name.is_empty() {
            continue;
        }
        params.push(split_name(&name, value));
    }

    params
}

/// Reads a quoted string body. Returns the unescaped value and the number
/// of bytes consumed including the closing quote, if any.
fn read_quoted(input: &str) -> (String, usize) {
    let mut value = String::new();
    let mut escaped = false;
    for (index, ch) in input.char_indices() {
        if escaped {
            value.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return (value, index + 1);
        } else {
            value.push(ch);
        }
    }
    (value, input.len())
}

fn split_name(name: &str, value: String) -> RawParam {
    let (base, extended) = name
        .strip_suffix('*')
        .map_or((name, false), |base| (base, true));

    if let Some((stem, section)) = base.rsplit_once('*')
        && let Ok(section) = section.parse::<u32>()
    {
        return RawParam {
            name: stem.to_string(),
            section: Some(section),
            extended,
            value,
        };
    }

    RawParam {
        name: base.to_string(),
        section: None,
        extended,
        value,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_split_value() {
        assert_eq!(split_value("text/plain"), ("text/plain", ""));
        assert_eq!(
            split_value("attachment; filename=a.pdf"),
            ("attachment", " filename=a.pdf")
        );
        assert_eq!(split_value(" inline ;x=1"), ("inline", "x=1"));
    }

    #[test]
    fn test_plain_and_quoted() {
        let params = parse_parameters(" charset=UTF-8; Name=\"a; b.pdf\"").unwrap();
        assert_eq!(params.get("charset").map(String::as_str), Some("UTF-8"));
        assert_eq!(params.get("name").map(String::as_str), Some("a; b.pdf"));
    }

    #[test]
    fn test_quoted_escapes() {
        let params = parse_parameters("filename=\"say \\\"hi\\\".pdf\"").unwrap();
        assert_eq!(
            params.get("filename").map(String::as_str),
            Some("say \"hi\".pdf")
        );
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let params = parse_parameters("junk; =x; size=10;").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("size").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let params = parse_parameters("a=1; a=2").unwrap();
        assert_eq!(params.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_rfc2231_extended() {
        let params = parse_parameters("filename*=UTF-8''%D7%AA%D7%9C%D7%95%D7%A9.pdf").unwrap();
        assert_eq!(params.get("filename").map(String::as_str), Some("תלוש.pdf"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let params = parse_parameters(
            "filename*0*=utf-8'he'123456789_; filename*1=\"2024_\"; filename*2*=01.pdf",
        )
        .unwrap();
        assert_eq!(
            params.get("filename").map(String::as_str),
            Some("123456789_2024_01.pdf")
        );
    }

    #[test]
    fn test_rfc2231_overrides_plain() {
        let params =
            parse_parameters("filename=fallback.pdf; filename*=utf-8''real.pdf").unwrap();
        assert_eq!(params.get("filename").map(String::as_str), Some("real.pdf"));
    }

    #[test]
    fn test_rfc2231_unknown_charset() {
        let err = parse_parameters("filename*=x-klingon''abc").unwrap_err();
        assert!(err.is_charset());
    }
}
