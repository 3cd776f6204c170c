use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::agent::Agent;

/// Key of the record holding the agent collection
pub const AGENTS_KEY: &str = "lottery_console_agents";

/// Durable, application-scoped record of the agent collection.
///
/// One JSON array per key, rewritten whole on every save.
pub struct AgentStore {
    path: PathBuf,
}

impl AgentStore {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{AGENTS_KEY}.json")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored collection. Missing or unreadable state yields an empty one.
    pub fn load(&self) -> Vec<Agent> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read agent store");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Agent>>(&data) {
            Ok(agents) => {
                debug!(count = agents.len(), "loaded agents");
                agents
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "agent store is corrupt, starting empty"
                );
                Vec::new()
            }
        }
    }

    /// Replace the stored collection with `agents`.
    pub fn save(&self, agents: &[Agent]) -> std::io::Result<()> {
        let data = serde_json::to_string_pretty(agents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        debug!(count = agents.len(), "saved agents");
        Ok(())
    }

    pub fn clear(&self) -> std::io::Result<()> {
        self.save(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(n: usize) -> Vec<Agent> {
        (0..n)
            .map(|i| Agent::new(format!("0x{:040x}", i + 1), format!("0x{:064x}", i + 1)))
            .collect()
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        let agents = sample(3);
        store.save(&agents).unwrap();

        let reopened = AgentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load(), agents);
    }

    #[test]
    fn test_save_overwrites_whole_collection() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        store.save(&sample(3)).unwrap();
        store.save(&sample(1)).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_corrupt_store_fails_soft() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        store.save(&sample(2)).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let dir = tempdir().unwrap();
        let store = AgentStore::open(dir.path()).unwrap();
        fs::write(
            store.path(),
            r#"[{"address":"0x01","privateKey":"0x02","ethBalance":"0.001","usdtBalance":"100.0"}]"#,
        )
        .unwrap();

        let agents = store.load();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].native_balance, "0.001");
        assert_eq!(agents[0].token_balance, "100.0");
    }
}
