//! Query construction against the Wayback Machine CDX index.
//!
//! Everything here is pure: no network access, no clocks, no randomness.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// CDX search endpoint queried by every mode.
pub const CDX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

/// Shared tail of every query: one row per unique URL key, plain text,
/// original URL column only, successful captures only.
const COMMON_PARAMS: &str = "&collapse=urlkey&output=text&fl=original&filter=statuscode:200";

/// File extensions that commonly leak data when left on a web server.
pub const SENSITIVE_EXTENSIONS: &[&str] = &[
    "xls", "xml", "xlsx", "json", "pdf", "sql", "doc", "docx", "pptx", "txt", "zip", "tar.gz",
    "tgz", "bak", "7z", "rar", "log", "cache", "secret", "db", "backup", "yml", "gz", "git",
    "config", "csv", "yaml", "md", "md5", "exe", "dll", "bin", "ini", "bat", "sh", "tar", "deb",
    "rpm", "iso", "img", "apk", "msi", "env", "dmg", "tmp", "crt", "pem", "key", "pub", "asc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryMode {
    /// Exact domain, every path.
    #[default]
    MainDomain,
    /// Domain and all of its subdomains, every path.
    WildcardDomain,
    /// Everything below a specific `https://` host and path prefix.
    SpecificPath,
    /// Wildcard domain, restricted to [`SENSITIVE_EXTENSIONS`].
    SensitiveExtensions,
}

impl QueryMode {
    pub const ALL: [QueryMode; 4] = [
        QueryMode::MainDomain,
        QueryMode::WildcardDomain,
        QueryMode::SpecificPath,
        QueryMode::SensitiveExtensions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            QueryMode::MainDomain => "Main domain",
            QueryMode::WildcardDomain => "Wildcard domain",
            QueryMode::SpecificPath => "Specific path",
            QueryMode::SensitiveExtensions => "Sensitive file extensions",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid input: enter the domain or URL first")]
    EmptyInput,
    #[error("invalid input: {target:?} is not a valid host or URL ({reason})")]
    InvalidTarget { target: String, reason: String },
    #[error("invalid input: year {0} is outside 1000..=9999")]
    InvalidYear(u16),
    #[error("invalid input: year range {from}..{to} is inverted")]
    InvertedYears { from: u16, to: u16 },
}

/// Optional capture-time bounds, in whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearRange {
    from: Option<u16>,
    to: Option<u16>,
}

impl YearRange {
    pub fn new(from: Option<u16>, to: Option<u16>) -> Result<Self, QueryError> {
        for year in [from, to].into_iter().flatten() {
            if !(1000..=9999).contains(&year) {
                return Err(QueryError::InvalidYear(year));
            }
        }
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(QueryError::InvertedYears { from, to });
            }
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> Option<u16> {
        self.from
    }

    pub fn to(&self) -> Option<u16> {
        self.to
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// A validated query. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    raw_input: String,
    mode: QueryMode,
    years: YearRange,
}

/// The fully qualified URL a [`QueryRequest`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub url: String,
}

impl QueryRequest {
    /// Validates user input. Blank input, or input that is only a scheme,
    /// is rejected before any URL is built.
    pub fn new(raw_input: impl Into<String>, mode: QueryMode) -> Result<Self, QueryError> {
        let raw_input = raw_input.into();
        let target = normalize_target(&raw_input);
        if target.is_empty() {
            return Err(QueryError::EmptyInput);
        }
        url::Url::parse(&format!("https://{target}")).map_err(|err| {
            QueryError::InvalidTarget {
                target: target.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            raw_input,
            mode,
            years: YearRange::default(),
        })
    }

    pub fn with_years(mut self, years: YearRange) -> Self {
        self.years = years;
        self
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn years(&self) -> YearRange {
        self.years
    }

    pub fn resolve(&self) -> ResolvedQuery {
        let mut url = build_url(&self.raw_input, self.mode);
        if let Some(from) = self.years.from {
            url.push_str(&format!("&from={from:04}"));
        }
        if let Some(to) = self.years.to {
            url.push_str(&format!("&to={to:04}"));
        }
        ResolvedQuery { url }
    }
}

/// Builds the CDX query URL for `raw_input` in the given mode.
///
/// Callers are expected to reject empty input first (see [`QueryRequest::new`]).
pub fn build_url(raw_input: &str, mode: QueryMode) -> String {
    let target = escape_query_value(normalize_target(raw_input));
    match mode {
        QueryMode::MainDomain => format!("{CDX_ENDPOINT}?url={target}/*{COMMON_PARAMS}"),
        QueryMode::WildcardDomain => format!("{CDX_ENDPOINT}?url=*.{target}/*{COMMON_PARAMS}"),
        QueryMode::SpecificPath => {
            format!("{CDX_ENDPOINT}?url=https://{target}/*{COMMON_PARAMS}")
        }
        QueryMode::SensitiveExtensions => format!(
            "{CDX_ENDPOINT}?url=*.{target}/*{COMMON_PARAMS}&filter=original:{}",
            sensitive_extension_pattern()
        ),
    }
}

/// Regex (CDX filter syntax) matching an original URL ending in one of
/// [`SENSITIVE_EXTENSIONS`].
pub fn sensitive_extension_pattern() -> String {
    let alternatives = SENSITIVE_EXTENSIONS
        .iter()
        .map(|ext| ext.replace('.', "\\."))
        .collect::<Vec<_>>()
        .join("|");
    format!(".*\\.({alternatives})$")
}

/// Percent-encodes the characters that would end or split the `url=` value:
/// `&` and `#` delimit the query, `+` decodes to a space and `%` starts an escape.
fn escape_query_value(target: &str) -> Cow<'_, str> {
    if !target.contains(['%', '&', '#', '+']) {
        return Cow::Borrowed(target);
    }
    let mut escaped = String::with_capacity(target.len() + 8);
    for ch in target.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '&' => escaped.push_str("%26"),
            '#' => escaped.push_str("%23"),
            '+' => escaped.push_str("%2B"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Trims whitespace, drops one leading `http://` or `https://`, any
/// `#fragment` and any trailing slashes.
pub fn normalize_target(raw_input: &str) -> &str {
    let trimmed = raw_input.trim();
    let without_scheme = ["https://", "http://"]
        .iter()
        .find_map(|scheme| {
            trimmed
                .get(..scheme.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
                .map(|_| &trimmed[scheme.len()..])
        })
        .unwrap_or(trimmed);
    let without_fragment = without_scheme
        .split_once('#')
        .map_or(without_scheme, |(head, _)| head);
    without_fragment.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_case_insensitively() {
        assert_eq!(normalize_target("HTTPS://Example.com/"), "Example.com");
        assert_eq!(normalize_target("  http://example.com  "), "example.com");
        assert_eq!(normalize_target("example.com"), "example.com");
    }

    #[test]
    fn fragment_is_dropped() {
        assert_eq!(normalize_target("example.com/page#top"), "example.com/page");
        assert_eq!(normalize_target("https://example.com/#/"), "example.com");
        assert_eq!(
            QueryRequest::new("#anchor", QueryMode::MainDomain),
            Err(QueryError::EmptyInput)
        );
    }

    #[test]
    fn only_leading_scheme_is_stripped() {
        assert_eq!(
            normalize_target("example.com/redirect/https://other"),
            "example.com/redirect/https://other"
        );
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        assert_eq!(normalize_target("ü"), "ü");
        assert_eq!(normalize_target("日本語.jp"), "日本語.jp");
    }

    #[test]
    fn scheme_only_input_is_empty() {
        assert_eq!(
            QueryRequest::new("https://", QueryMode::MainDomain),
            Err(QueryError::EmptyInput)
        );
        assert_eq!(
            QueryRequest::new("   ", QueryMode::MainDomain),
            Err(QueryError::EmptyInput)
        );
    }

    #[test]
    fn host_with_spaces_is_rejected() {
        let err = QueryRequest::new("exa mple.com", QueryMode::MainDomain).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTarget { .. }));
    }

    #[test]
    fn year_range_validation() {
        assert!(YearRange::new(Some(2015), Some(2020)).is_ok());
        assert_eq!(
            YearRange::new(Some(2021), Some(2020)),
            Err(QueryError::InvertedYears {
                from: 2021,
                to: 2020
            })
        );
        assert_eq!(
            YearRange::new(Some(99), None),
            Err(QueryError::InvalidYear(99))
        );
        assert!(YearRange::new(None, None).unwrap().is_unbounded());
    }

    #[test]
    fn extension_list_is_curated_size() {
        assert!(SENSITIVE_EXTENSIONS.len() >= 45);
        assert!(sensitive_extension_pattern().contains("tar\\.gz"));
    }
}
