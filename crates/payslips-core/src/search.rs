//! Translation of the configured filter into an IMAP SEARCH key.

use payslips_imap::SearchKey;

use crate::config::FilterConfig;

/// Which messages to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Body substrings, any of which may match.
    pub body: Vec<String>,
    /// Required `From` header substring.
    pub from: Option<String>,
    /// Required `Subject` header substring.
    pub subject: Option<String>,
}

impl SearchCriteria {
    /// Builds criteria from the filter configuration.
    #[must_use]
    pub fn from_filter(filter: &FilterConfig) -> Self {
        Self {
            body: filter.body.clone(),
            from: filter.from.clone(),
            subject: filter.subject.clone(),
        }
    }

    /// Builds the SEARCH key.
    ///
    /// Body terms are alternatives (`OR BODY a BODY b`); `From` and `Subject`
    /// are `HEADER` terms that must all hold. Empty strings are ignored; with
    /// nothing left the key is `ALL`.
    #[must_use]
    pub fn to_search_key(&self) -> SearchKey {
        let body = SearchKey::any_of(
            self.body
                .iter()
                .filter(|term| !term.is_empty())
                .map(|term| SearchKey::Body(term.clone())),
        );

        let headers = [("FROM", &self.from), ("SUBJECT", &self.subject)]
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| SearchKey::Header(name.to_string(), v.to_string()))
            });

        SearchKey::all_of(body.into_iter().chain(headers))
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
    use payslips_imap::{Command, LiteralMode};

    fn wire(key: SearchKey) -> Vec<u8> {
        Command::Search { key }
            .serialize("A1", LiteralMode::NonSynchronizing)
            .to_vec()
    }

    #[test]
    fn test_nothing_constrained_is_all() {
        assert_eq!(SearchCriteria::default().to_search_key(), SearchKey::All);

        let criteria = SearchCriteria {
            body: vec![String::new()],
            from: Some(String::new()),
            subject: None,
        };
        assert_eq!(criteria.to_search_key(), SearchKey::All);
    }

    #[test]
    fn test_single_body_term() {
        let criteria = SearchCriteria {
            body: vec!["payslip".to_string()],
            ..SearchCriteria::default()
        };
        assert_eq!(criteria.to_search_key(), SearchKey::Body("payslip".to_string()));
    }

    #[test]
    fn test_body_terms_are_alternatives() {
        let criteria = SearchCriteria {
            body: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            ..SearchCriteria::default()
        };
        assert_eq!(
            wire(criteria.to_search_key()),
            b"A1 SEARCH OR BODY \"a\" OR BODY \"b\" BODY \"c\"\r\n"
        );
    }

    #[test]
    fn test_headers_are_required() {
        let criteria = SearchCriteria {
            body: vec!["a".to_string(), "b".to_string()],
            from: Some("hr@example.com".to_string()),
            subject: Some("Payslip".to_string()),
        };
        assert_eq!(
            wire(criteria.to_search_key()),
            b"A1 SEARCH OR BODY \"a\" BODY \"b\" HEADER FROM \"hr@example.com\" HEADER SUBJECT \"Payslip\"\r\n"
        );
    }

    #[test]
    fn test_from_filter_default_is_hebrew_body() {
        let criteria = SearchCriteria::from_filter(&FilterConfig::default());
        let key = criteria.to_search_key();
        assert!(key.needs_utf8());
        assert_eq!(key, SearchKey::Body("תלוש משכורת".to_string()));
    }
}
