//! Конфигурация бота: токен, путь к БД, списки администраторов и монтажников.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    #[serde(default)]
    pub allowed_ids: Vec<i64>,
    #[serde(default)]
    pub reports_channel_id: Option<i64>,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("isp_bot.db")
}

fn default_list_page_size() -> usize {
    20
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Не удалось прочитать конфиг {}: {}", path.display(), e)
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let config: Config =
            toml::from_str(raw).map_err(|e| anyhow::anyhow!("Некорректный конфиг: {}", e))?;
        if config.admin_ids.is_empty() {
            tracing::warn!("admin_ids пуст: управлять сотрудниками будет некому");
        }
        Ok(config)
    }

    /// Токен из файла имеет приоритет над переменной окружения.
    pub fn bot_token(&self) -> Result<String, anyhow::Error> {
        if let Some(token) = self.bot_token.as_deref().map(str::trim)
            && !token.is_empty()
        {
            return Ok(token.to_string());
        }
        std::env::var(&self.bot_token_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Токен бота не задан: укажите bot_token или переменную {}",
                    self.bot_token_env
                )
            })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.is_admin(user_id) || self.allowed_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = Config::parse("admin_ids = [1]\n").unwrap();
        assert_eq!(config.db_path, PathBuf::from("isp_bot.db"));
        assert_eq!(config.bot_token_env, "TELEGRAM_BOT_TOKEN");
        assert_eq!(config.list_page_size, 20);
        assert!(config.reports_channel_id.is_none());
    }

    #[test]
    fn admins_are_implicitly_allowed() {
        let config = Config::parse("admin_ids = [1]\nallowed_ids = [2]\n").unwrap();
        assert!(config.is_admin(1));
        assert!(config.is_allowed(1));
        assert!(!config.is_admin(2));
        assert!(config.is_allowed(2));
        assert!(!config.is_allowed(3));
    }

    #[test]
    fn token_from_file_wins() {
        let config = Config::parse("bot_token = \" 123:abc \"\n").unwrap();
        assert_eq!(config.bot_token().unwrap(), "123:abc");
    }

    #[test]
    fn missing_token_is_an_error() {
        let config =
            Config::parse("bot_token_env = \"INSTALLER_LEDGER_TEST_TOKEN_UNSET\"\n").unwrap();
        assert!(config.bot_token().is_err());
    }
}
