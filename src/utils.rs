use crate::config::ServerConfig;
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Добавляет схему протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
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

    #[test]
    fn random_id_is_sixteen_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scheme_added_by_server_type() {
        let stun = ServerConfig::stun("s", "stun.example.org:3478");
        assert_eq!(add_ice_url_scheme(&stun), "stun:stun.example.org:3478");

        let turn = ServerConfig::turn("t", "turn.example.org:3478", "u", "p");
        assert_eq!(add_ice_url_scheme(&turn), "turn:turn.example.org:3478");

        let explicit = ServerConfig::stun("e", "turn:relay.example.org");
        assert_eq!(add_ice_url_scheme(&explicit), "turn:relay.example.org");
    }
}
