//! Read-only site settings consulted by trial requests.

use crate::config::SiteConfig;

/// Point-in-time view of the settings a trial request needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSnapshot {
    pub server_id: String,
    pub site_name: String,
    pub site_url: String,
    pub restrict_system_admin: bool,
}

/// Supplies the current site settings. Implementations may reload between calls.
pub trait SiteConfigProvider: Send + Sync {
    fn snapshot(&self) -> SiteSnapshot;
}

impl From<&SiteConfig> for SiteSnapshot {
    fn from(config: &SiteConfig) -> Self {
        Self {
            server_id: config.server_id.clone(),
            site_name: config.site_name.clone(),
            site_url: config.site_url.clone(),
            restrict_system_admin: config.restrict_system_admin,
        }
    }
}

impl SiteConfigProvider for SiteConfig {
    fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot::from(self)
    }
}

impl SiteConfigProvider for SiteSnapshot {
    fn snapshot(&self) -> SiteSnapshot {
        self.clone()
    }
}
