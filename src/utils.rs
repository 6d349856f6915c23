use crate::config::IceServerConfig;
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefixes the ICE server URL with `stun:` or `turn:` when the operator
/// left the scheme out.
pub fn add_ice_url_scheme(config: &IceServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
        || config.url.starts_with("stuns:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(kind: &str, url: &str) -> IceServerConfig {
        IceServerConfig {
            id: "t".into(),
            r#type: kind.into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    #[test]
    fn scheme_is_added_only_when_missing() {
        assert_eq!(add_ice_url_scheme(&server("stun", "example.org:3478")), "stun:example.org:3478");
        assert_eq!(add_ice_url_scheme(&server("turn", "relay.example.org")), "turn:relay.example.org");
        assert_eq!(add_ice_url_scheme(&server("turn", "stun:x:1")), "stun:x:1");
    }

    #[test]
    fn random_ids_are_hex() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }
}
