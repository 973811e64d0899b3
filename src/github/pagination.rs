//! RFC 8288 `Link` header parsing for cursor-style pagination.

/// Pagination cursors extracted from a `Link` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PaginationLinks {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Parse a header like
/// `<https://api.github.com/...&page=2>; rel="next", <...&page=5>; rel="last"`.
///
/// Unknown relations and malformed segments are ignored.
pub fn parse_link_header(value: &str) -> PaginationLinks {
    let mut links = PaginationLinks::default();

    for segment in value.split(',') {
        let mut parts = segment.split(';');
        let Some(target) = parts.next().map(str::trim) else {
            continue;
        };
        let Some(url) = target
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        else {
            continue;
        };

        for param in parts {
            let Some((key, rel)) = param.trim().split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            // A single rel attribute may list several space-separated relations.
            for rel in rel.trim().trim_matches('"').split_whitespace() {
                let slot = match rel {
                    "next" => &mut links.next,
                    "prev" => &mut links.prev,
                    "first" => &mut links.first,
                    "last" => &mut links.last,
                    _ => continue,
                };
                *slot = Some(url.to_string());
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_link_header() {
        let header = r#"<https://api.github.com/repositories/1/pulls?page=2>; rel="next", <https://api.github.com/repositories/1/pulls?page=9>; rel="last""#;
        let links = parse_link_header(header);
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.github.com/repositories/1/pulls?page=2")
        );
        assert_eq!(
            links.last.as_deref(),
            Some("https://api.github.com/repositories/1/pulls?page=9")
        );
        assert!(links.prev.is_none());
        assert!(links.has_next());
    }

    #[test]
    fn test_last_page_has_no_next() {
        let header = r#"<https://api.github.com/x?page=1>; rel="first", <https://api.github.com/x?page=8>; rel="prev""#;
        let links = parse_link_header(header);
        assert!(!links.has_next());
        assert!(links.first.is_some());
        assert!(links.prev.is_some());
    }

    #[test]
    fn test_malformed_segments_are_ignored() {
        assert_eq!(parse_link_header(""), PaginationLinks::default());
        assert_eq!(
            parse_link_header("https://no-brackets; rel=\"next\""),
            PaginationLinks::default()
        );
        let links = parse_link_header("<https://x/?page=2>; rel=next");
        assert_eq!(links.next.as_deref(), Some("https://x/?page=2"));
    }

    #[test]
    fn test_multiple_relations_in_one_segment() {
        let links = parse_link_header(r#"<https://x/?page=2>; rel="next last""#);
        assert_eq!(links.next, links.last);
        assert!(links.next.is_some());
    }
}
