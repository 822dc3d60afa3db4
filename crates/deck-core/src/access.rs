//! Static admin allow-list plus the persisted "anyone may add items" switch.

use crate::config::Config;
use crate::db::{DeckDb, ALLOW_USER_ADD};
use crate::error::{DeckError, Result};

#[derive(Debug, Clone)]
pub struct AccessList {
    admins: Vec<String>,
    default_allow_user_add: bool,
}

impl AccessList {
    pub fn new(admins: Vec<String>, default_allow_user_add: bool) -> Self {
        Self {
            admins,
            default_allow_user_add,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.admins.clone(), config.allow_user_add)
    }

    pub fn is_admin(&self, user: &str) -> bool {
        let user = user.trim_start_matches('@');
        self.admins
            .iter()
            .any(|a| a.trim_start_matches('@') == user)
    }

    pub fn require_admin(&self, user: &str) -> Result<()> {
        if self.is_admin(user) {
            Ok(())
        } else {
            Err(DeckError::PermissionDenied(format!(
                "'{user}' is not an admin"
            )))
        }
    }

    /// Admins may always add items; everyone else only while additions are
    /// unlocked.
    pub fn require_can_add(&self, user: &str, allow_user_add: bool) -> Result<()> {
        if allow_user_add || self.is_admin(user) {
            Ok(())
        } else {
            Err(DeckError::PermissionDenied(
                "adding items is locked to admins".into(),
            ))
        }
    }

    /// Current value of the switch; the config value until first toggled.
    pub fn allow_user_add(&self, db: &DeckDb) -> Result<bool> {
        Ok(db
            .get_setting::<bool>(ALLOW_USER_ADD)?
            .unwrap_or(self.default_allow_user_add))
    }

    pub fn set_allow_user_add(&self, db: &DeckDb, user: &str, allow: bool) -> Result<()> {
        self.require_admin(user)?;
        db.set_setting(ALLOW_USER_ADD, &allow)?;
        tracing::info!(user, allow, "item additions toggled");
        Ok(())
    }
}
