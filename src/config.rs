// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::error::{Error, Result};
use crate::peer::types::MediaKind;
use serde::{Deserialize, Serialize};

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Default pre-gathered candidate pool, matches what the desktop app used.
pub const DEFAULT_CANDIDATE_POOL_SIZE: u8 = 10;

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            r#type: "stun".into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        id: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            r#type: "turn".into(),
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "server {}: URL cannot be empty",
                self.id
            )));
        }
        if self.r#type == "turn" && (self.username.is_none() || self.credential.is_none()) {
            return Err(Error::InvalidConfig(format!(
                "server {}: TURN servers require username and credential",
                self.id
            )));
        }
        Ok(())
    }
}

/// Per-session negotiator settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NegotiatorConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub ice_candidate_pool_size: u8,
    /// Media lines the initiator offers, in m-line order
    pub media: Vec<MediaKind>,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            ice_candidate_pool_size: DEFAULT_CANDIDATE_POOL_SIZE,
            media: vec![MediaKind::Audio, MediaKind::Video],
        }
    }
}

impl NegotiatorConfig {
    /// Replaces the ICE server list after validating every entry.
    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Result<Self> {
        for server in &servers {
            server.validate()?;
        }
        self.ice_servers = servers;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.ice_servers.iter().try_for_each(ServerConfig::validate)
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::stun("default-stun", "stun:stun.l.google.com:19302"),
        ServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
}
