// Process-wide lookup of connection managers, one per robot.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use url::Url;

use crate::config::PubSubConfig;
use crate::error::CoreError;
use crate::manager::ConnectionManager;

/// Maps a robot's REST base URL to its shared [`ConnectionManager`].
///
/// Pass one registry around instead of constructing managers ad hoc, so
/// every caller talking to the same robot shares live subscriptions and the
/// latest-payload cache.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    managers: DashMap<Url, ConnectionManager>,
    config: PubSubConfig,
}

impl ManagerRegistry {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            managers: DashMap::new(),
            config,
        }
    }

    /// Manager for `robot`, created on first use.
    pub fn get_or_create(&self, robot: &Url) -> Result<ConnectionManager, CoreError> {
        if let Some(existing) = self.managers.get(robot) {
            return Ok(existing.value().clone());
        }
        let entry = self.managers.entry(robot.clone());
        let manager = match entry {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let manager = ConnectionManager::for_robot(robot, self.config.clone())?;
                e.insert(manager).clone()
            }
        };
        Ok(manager)
    }

    pub fn get(&self, robot: &Url) -> Option<ConnectionManager> {
        self.managers.get(robot).map(|m| m.value().clone())
    }

    /// Remove and shut down the manager for `robot`.
    pub async fn remove(&self, robot: &Url) -> bool {
        let Some((_, manager)) = self.managers.remove(robot) else {
            return false;
        };
        manager.shutdown().await;
        true
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
