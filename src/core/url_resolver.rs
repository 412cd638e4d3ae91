use crate::error::{ClientError, Result};
use url::Url;

/// C1: resolves relative candidate URLs against the control document's
/// referrer URL (spec §4.1).
pub struct UrlResolver;

impl UrlResolver {
    /// True iff `s` begins with a scheme: `<alpha>[<alnum>+-.]*:`.
    pub fn is_absolute(s: &str) -> bool {
        let mut chars = s.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() => {}
            _ => return false,
        }
        for (i, c) in chars {
            if c == ':' {
                return i > 0;
            }
            if !(c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
                return false;
            }
        }
        false
    }

    /// Resolve `maybe_relative` against `referrer`. Absolute input is
    /// returned unchanged (for any referrer, including `None`).
    pub fn resolve(referrer: Option<&str>, maybe_relative: &str) -> Result<String> {
        if Self::is_absolute(maybe_relative) {
            return Ok(maybe_relative.to_string());
        }

        let referrer = referrer.ok_or_else(|| ClientError::NoReferrerForRelativeUrl {
            url: maybe_relative.to_string(),
        })?;

        let base = Url::parse(referrer).map_err(|_| ClientError::NoReferrerForRelativeUrl {
            url: maybe_relative.to_string(),
        })?;

        let joined = base
            .join(maybe_relative)
            .map_err(|_| ClientError::NoReferrerForRelativeUrl { url: maybe_relative.to_string() })?;

        Ok(joined.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls_detected() {
        assert!(UrlResolver::is_absolute("http://example.com/f"));
        assert!(UrlResolver::is_absolute("https://example.com/f"));
        assert!(UrlResolver::is_absolute("ftp://example.com/f"));
        assert!(UrlResolver::is_absolute("a+b-c.d://x"));
    }

    #[test]
    fn relative_paths_are_not_absolute() {
        assert!(!UrlResolver::is_absolute("/some/path"));
        assert!(!UrlResolver::is_absolute("some/path"));
        assert!(!UrlResolver::is_absolute("../some/path"));
        assert!(!UrlResolver::is_absolute(""));
        assert!(!UrlResolver::is_absolute("1ab://x"));
    }

    #[test]
    fn absolute_input_passes_through_regardless_of_referrer() {
        let v = UrlResolver::resolve(None, "http://example.com/f.bin").unwrap();
        assert_eq!(v, "http://example.com/f.bin");

        let v = UrlResolver::resolve(Some("http://other.example/x"), "http://example.com/f.bin").unwrap();
        assert_eq!(v, "http://example.com/f.bin");
    }

    #[test]
    fn relative_without_referrer_fails() {
        let err = UrlResolver::resolve(None, "f.bin").unwrap_err();
        assert!(matches!(err, ClientError::NoReferrerForRelativeUrl { .. }));
    }

    #[test]
    fn relative_with_referrer_merges() {
        let v = UrlResolver::resolve(Some("http://example.com/dir/control.zsync"), "f.bin").unwrap();
        assert_eq!(v, "http://example.com/dir/f.bin");
    }

    #[test]
    fn relative_authority_inherited() {
        let v = UrlResolver::resolve(Some("http://example.com/a/b/c.zsync"), "../f.bin").unwrap();
        assert_eq!(v, "http://example.com/a/f.bin");
    }
}
