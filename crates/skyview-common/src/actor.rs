use smol_str::SmolStr;
use url::Url;

/// Normalize a user-typed handle into an actor identifier the service accepts.
///
/// Trims whitespace, drops a leading `@` and lowercases. A bare name (no `.`
/// and no `:`) gets the service host appended, so `alice` against
/// `https://bsky.social` becomes `alice.bsky.social`. A non-default port is
/// part of the host. DIDs pass through.
///
/// Returns `None` when nothing is left to look up.
pub fn normalize_handle(input: &str, service: &Url) -> Option<SmolStr> {
    let handle = input.trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle).trim();
    if handle.is_empty() {
        return None;
    }
    let handle = handle.to_lowercase();

    if handle.contains('.') || handle.contains(':') {
        return Some(SmolStr::new(handle));
    }
    let Some(host) = service.host_str() else {
        return Some(SmolStr::new(handle));
    };
    let host = host.to_lowercase();
    Some(match service.port() {
        Some(port) => SmolStr::new(format!("{handle}.{host}:{port}")),
        None => SmolStr::new(format!("{handle}.{host}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Url {
        Url::parse("https://bsky.social").unwrap()
    }

    #[test]
    fn test_bare_name_gets_service_domain() {
        assert_eq!(
            normalize_handle("alice", &service()).as_deref(),
            Some("alice.bsky.social")
        );
    }

    #[test]
    fn test_strips_at_trims_and_lowercases() {
        assert_eq!(
            normalize_handle("  @Alice.Example.COM ", &service()).as_deref(),
            Some("alice.example.com")
        );
        assert_eq!(
            normalize_handle("@Bob", &service()).as_deref(),
            Some("bob.bsky.social")
        );
    }

    #[test]
    fn test_did_passes_through() {
        assert_eq!(
            normalize_handle("did:plc:uowmeg4dqtanpmjuknadqjqc", &service()).as_deref(),
            Some("did:plc:uowmeg4dqtanpmjuknadqjqc")
        );
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(normalize_handle("", &service()), None);
        assert_eq!(normalize_handle("  @ ", &service()), None);
    }

    #[test]
    fn test_custom_service_host() {
        let pds = Url::parse("http://localhost:2583").unwrap();
        assert_eq!(
            normalize_handle("carol", &pds).as_deref(),
            Some("carol.localhost:2583")
        );
        let default_port = Url::parse("https://pds.example.com:443").unwrap();
        assert_eq!(
            normalize_handle("carol", &default_port).as_deref(),
            Some("carol.pds.example.com")
        );
    }
}
