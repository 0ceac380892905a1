//! 服务配置

use config::{Config, Environment, File};
use serde::Deserialize;
use telerad_billing::GatewayConfig;
use telerad_core::{Result, TeleradError};
use telerad_database::DatabaseConfig;

/// HTTP服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

/// 支付网关配置
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_timeout() -> u64 {
    10
}

impl From<GatewaySettings> for GatewayConfig {
    fn from(settings: GatewaySettings) -> Self {
        GatewayConfig {
            secret_key: settings.secret_key,
            webhook_secret: settings.webhook_secret,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// 全量服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub database: DatabaseConfig,
    pub auth: AuthSettings,
    pub gateway: GatewaySettings,
}

impl Settings {
    /// 从配置文件与环境变量加载，环境变量优先
    ///
    /// 环境变量形如 TELERAD__DATABASE__URL。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        } else {
            builder = builder.add_source(File::with_name("config/telerad").required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("TELERAD").separator("__"))
            .build()
            .map_err(|e| TeleradError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| TeleradError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_deserialize() {
        let raw = r#"
            [database]
            url = "postgres://localhost/telerad"

            [auth]
            jwt_secret = "test-secret"

            [gateway]
            secret_key = "sk_test_123"
            webhook_secret = "whsec_456"
        "#;

        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.database.url, "postgres://localhost/telerad");
        assert_eq!(settings.gateway.timeout_secs, 10);
    }
}
