//! Credential extraction from an upgrade/request surface.

use http::HeaderMap;

const SESSION_COOKIES: &[&str] = &["__session", "__clerk_session"];

/// Pull a credential out of a request, in precedence order:
/// `Authorization: Bearer`, session cookies, then the `token` query
/// parameter.
#[must_use]
pub fn extract_credential(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(bearer) = bearer_token(headers) {
        return Some(bearer);
    }
    if let Some(cookie) = session_cookie(headers) {
        return Some(cookie);
    }
    query.and_then(query_token)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(http::header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let name = parts.next()?.trim();
        let value = parts.next().unwrap_or("").trim();
        if SESSION_COOKIES.contains(&name) && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

fn query_token(query: &str) -> Option<String> {
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some("token") {
            let value = parts.next().unwrap_or("");
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use {super::*, http::HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_header_wins() {
        let h = headers(&[
            ("authorization", "Bearer tok_abc"),
            ("cookie", "__session=cookie_tok"),
        ]);
        assert_eq!(
            extract_credential(&h, Some("token=query_tok")).as_deref(),
            Some("tok_abc")
        );
    }

    #[test]
    fn session_cookie_before_query() {
        let h = headers(&[("cookie", "theme=dark; __clerk_session=cookie_tok")]);
        assert_eq!(
            extract_credential(&h, Some("token=query_tok")).as_deref(),
            Some("cookie_tok")
        );
    }

    #[test]
    fn query_token_as_last_resort() {
        let h = HeaderMap::new();
        assert_eq!(
            extract_credential(&h, Some("chatType=text&token=query_tok")).as_deref(),
            Some("query_tok")
        );
    }

    #[test]
    fn nothing_yields_none() {
        let h = headers(&[("cookie", "theme=dark")]);
        assert_eq!(extract_credential(&h, Some("a=b")), None);
        assert_eq!(extract_credential(&h, None), None);
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let h = headers(&[("authorization", "Bearer ")]);
        assert_eq!(extract_credential(&h, None), None);
    }
}
