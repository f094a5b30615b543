// Конфигурация приложения
// В режиме отладки логирование подробнее, в продакшене только info

use crate::error::ConfigError;
use crate::peer::connection::validate_ice_servers;
use crate::peer::types::ServerConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "debug,webrtc=info,webrtc_ice=warn";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "info,webrtc=warn";

/// Имя файла конфигурации (без расширения, ищется в рабочем каталоге)
pub const CONFIG_FILE: &str = "ssc-share";

/// Префикс переменных окружения: SSC_LISTEN_ADDR, SSC_VIDEO_IVF_PATH, ...
pub const ENV_PREFIX: &str = "SSC";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: String,
    pub ice_servers: Vec<ServerConfig>,
    pub video_ivf_path: Option<PathBuf>,
    pub audio_ogg_path: Option<PathBuf>,
    /// Открывать звук вместе с экраном (с откатом на одно видео)
    pub bundle_audio: bool,
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            ice_servers: Vec::new(),
            video_ivf_path: None,
            audio_ogg_path: None,
            bundle_audio: true,
            log_filter: None,
        }
    }
}

impl Settings {
    /// Загрузка: ssc-share.toml (если есть) и переменные окружения SSC_*
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        validate_ice_servers(&self.ice_servers)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::ListenAddr(self.listen_addr.clone()))
    }
}
