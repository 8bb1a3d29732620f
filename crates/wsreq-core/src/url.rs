//! Scheme mapping between the event channel and HTTP.

/// Map an event-channel URI to its HTTP base (`ws` → `http`, `wss` → `https`).
///
/// URIs that do not start with `ws` are returned unchanged.
pub fn to_http(uri: &str) -> String {
    match uri.strip_prefix("ws") {
        Some(rest) => format!("http{rest}"),
        None => uri.to_owned(),
    }
}

/// Map an HTTP URI to the scheme used for dialing (`http` → `ws`, `https` → `wss`).
///
/// URIs that do not start with `http` are returned unchanged.
pub fn to_ws(uri: &str) -> String {
    match uri.strip_prefix("http") {
        Some(rest) => format!("ws{rest}"),
        None => uri.to_owned(),
    }
}

/// Append a path to a base URI without doubling the separator.
pub fn join(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) if !path.is_empty() => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Normalize a WebSocket mount path: empty becomes `/`, a leading slash is enforced.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_owned()
    } else if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn secure_socket_maps_to_https() {
        assert_eq!(to_http("wss://api.example.com"), "https://api.example.com");
    }

    #[test]
    fn plain_socket_maps_to_http() {
        assert_eq!(to_http("ws://localhost:45000"), "http://localhost:45000");
    }

    #[test]
    fn http_uri_unchanged_by_to_http() {
        assert_eq!(to_http("http://localhost:45000"), "http://localhost:45000");
    }

    #[test]
    fn to_ws_maps_both_schemes() {
        assert_eq!(to_ws("http://localhost:1"), "ws://localhost:1");
        assert_eq!(to_ws("https://host"), "wss://host");
        assert_eq!(to_ws("ws://host"), "ws://host");
    }

    #[test]
    fn join_handles_slashes() {
        assert_eq!(join("http://h", "/api"), "http://h/api");
        assert_eq!(join("http://h/", "/api"), "http://h/api");
        assert_eq!(join("http://h", "api"), "http://h/api");
        assert_eq!(join("http://h", ""), "http://h");
    }

    #[test]
    fn normalize_path_defaults_to_root() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("api/ws"), "/api/ws");
        assert_eq!(normalize_path("/api/ws"), "/api/ws");
    }

    proptest! {
        #[test]
        fn ws_and_http_mapping_are_inverse(host in "[a-z]{1,12}(\\.[a-z]{2,4})?", port in 1u16..=u16::MAX, secure in any::<bool>()) {
            let scheme = if secure { "wss" } else { "ws" };
            let uri = format!("{scheme}://{host}:{port}");
            prop_assert_eq!(to_ws(&to_http(&uri)), uri);
        }
    }
}
