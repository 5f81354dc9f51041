//! URL helpers for references found inside assets.
//!
//! References are split into a path and an untouched suffix (query and
//! fragment, including bare `?`/`#` markers) so rewriting the path never
//! disturbs cache-busting tricks such as `font.eot?#iefix`.


use percent_encoding::percent_decode_str;

/// A reference split at its first `?` or `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub path: &'a str,
    /// Everything from the first `?` or `#` on, byte-identical.
    pub suffix: &'a str,
}

impl<'a> UrlParts<'a> {
    pub fn split(url: &'a str) -> Self {
        let cut = url.find(['?', '#']).unwrap_or(url.len());
        Self {
            path: &url[..cut],
            suffix: &url[cut..],
        }
    }
}

/// True if the reference carries a scheme (`http:`, `data:`) or a network
/// location (`//cdn.example.com/x.png`).
pub fn is_external(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("//") || url::Url::parse(url).is_ok()
}

/// Strip a URL fragment (`font.svg#icon` -> `font.svg`).
pub fn strip_fragment(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

/// Resolve `reference` against `base` the way a browser would.
///
/// `base` is an absolute or root-relative directory URL such as
/// `/static/css/` or `css/` (the latter yields a root-relative result
/// without leading slash). Dot segments are removed; escaping above the
/// root clamps at the root.
pub fn join(base: &str, reference: &str) -> String {
    let relative_base = !base.starts_with('/');
    let base_url = if relative_base {
        url::Url::parse(&format!("http://x/{base}"))
    } else {
        url::Url::parse("http://x/").and_then(|root| root.join(base))
    };

    let joined = base_url.and_then(|b| b.join(reference));
    let path = match joined {
        Ok(url) => percent_decode_str(url.path())
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| url.path().to_string()),
        Err(_) => format!("{base}{reference}"),
    };

    if relative_base {
        path.trim_start_matches('/').to_string()
    } else {
        path
    }
}

/// Directory part of a logical path, with trailing slash (`css/a.css` -> `css/`).
pub fn dir_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_markers() {
        let parts = UrlParts::split("font.eot?#iefix");
        assert_eq!(parts.path, "font.eot");
        assert_eq!(parts.suffix, "?#iefix");

        let parts = UrlParts::split("a.png?#");
        assert_eq!(parts.suffix, "?#");

        let parts = UrlParts::split("#frag");
        assert_eq!(parts.path, "");
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("http://host/x.png"));
        assert!(is_external("//cdn.example.com/x.png"));
        assert!(is_external("data:image/png;base64,AAAA"));
        assert!(!is_external("../img/x.png"));
        assert!(!is_external("/static/img/x.png"));
        assert!(!is_external("img/x.png"));
    }

    #[test]
    fn test_join_absolute_base() {
        assert_eq!(join("/static/css/", "../img/x.png"), "/static/img/x.png");
        assert_eq!(join("/static/css/", "x.png"), "/static/css/x.png");
        assert_eq!(join("/static/css/", "/other/x.png"), "/other/x.png");
        assert_eq!(join("/static/", "../../x.png"), "/x.png");
    }

    #[test]
    fn test_join_relative_base() {
        assert_eq!(join("less/", "b.less"), "less/b.less");
        assert_eq!(join("less/sub/", "../b.less"), "less/b.less");
        assert_eq!(join("", "b.less"), "b.less");
    }

    #[test]
    fn test_join_decodes() {
        assert_eq!(join("/static/", "my file.png"), "/static/my file.png");
    }

    #[test]
    fn test_dir_of() {
        assert_eq!(dir_of("css/a.css"), "css/");
        assert_eq!(dir_of("a.css"), "");
    }
}
