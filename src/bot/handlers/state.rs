use crate::config::Config;
use crate::db::Db;
use std::sync::Arc;
use teloxide::types::Update;

#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Installer,
    Stranger,
}

/// Кто прислал текущий апдейт. Строится заново для каждого апдейта и
/// передаётся обработчикам как зависимость.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<i64>,
    pub role: Role,
}

impl RequestContext {
    pub fn resolve(user_id: Option<i64>, config: &Config) -> Self {
        let role = match user_id {
            Some(id) if config.is_admin(id) => Role::Admin,
            Some(id) if config.is_allowed(id) => Role::Installer,
            _ => Role::Stranger,
        };
        Self { user_id, role }
    }

    pub fn from_update(update: Update, state: BotState) -> Self {
        let user_id = update.from().map(|user| user.id.0 as i64);
        Self::resolve(user_id, &state.config)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Telegram ID автора изменений для журнала, 0 если неизвестен.
    pub fn actor(&self) -> i64 {
        self.user_id.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_follow_config_lists() {
        let config = Config::parse("admin_ids = [1]\nallowed_ids = [2]\n").unwrap();
        assert_eq!(RequestContext::resolve(Some(1), &config).role, Role::Admin);
        assert_eq!(RequestContext::resolve(Some(2), &config).role, Role::Installer);
        assert_eq!(RequestContext::resolve(Some(3), &config).role, Role::Stranger);
        assert_eq!(RequestContext::resolve(None, &config).role, Role::Stranger);
        assert!(RequestContext::resolve(Some(1), &config).is_admin());
        assert_eq!(RequestContext::resolve(None, &config).actor(), 0);
    }
}
