/// Normalize a company host to a bare lowercase hostname: scheme, userinfo,
/// path, and port are stripped.
pub fn normalize_host(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let without_path = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let without_userinfo = without_path.rsplit('@').next().unwrap_or(without_path);
    let host = without_userinfo
        .split(':')
        .next()
        .unwrap_or(without_userinfo)
        .trim()
        .to_ascii_lowercase();

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_decorations() {
        assert_eq!(
            normalize_host(Some("HTTPS://News.Example.COM/rss/path")),
            Some("news.example.com".to_string())
        );
        assert_eq!(
            normalize_host(Some("example.com:8443")),
            Some("example.com".to_string())
        );
        assert_eq!(
            normalize_host(Some("user@example.com")),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn blank_hosts_are_none() {
        assert_eq!(normalize_host(None), None);
        assert_eq!(normalize_host(Some("   ")), None);
        assert_eq!(normalize_host(Some("https://")), None);
    }
}
