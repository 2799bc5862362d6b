//! Persistent command history. A JSON file holds the recorded commands;
//! the panel reads them back filtered by the active search query.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Most recent commands kept; older ones fall off the front.
pub const MAX_COMMANDS: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    history: HistorySection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistorySection {
    #[serde(default)]
    commands: Vec<String>,
}

/// File-backed history of recorded commands, deduplicated and capped.
pub struct HistoryStore {
    path: Option<PathBuf>,
    commands: Mutex<Vec<String>>,
}

impl HistoryStore {
    /// Open the store at `path`, creating an empty one (and its parent
    /// directory) if missing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let commands = if path.exists() {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let file: StoreFile =
                serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
            file.history.commands
        } else {
            let store = Self {
                path: Some(path.to_path_buf()),
                commands: Mutex::new(Vec::new()),
            };
            store.persist()?;
            return Ok(store);
        };
        debug!(count = commands.len(), path = %path.display(), "history store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            commands: Mutex::new(commands),
        })
    }

    /// An in-memory store with no backing file.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            commands: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        match self.commands.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a command. Already-recorded commands keep their original
    /// position; the store never exceeds [`MAX_COMMANDS`], dropping the
    /// oldest entries first.
    pub fn append(&self, raw: &str) -> Result<()> {
        {
            let mut commands = self.lock();
            if !commands.iter().any(|c| c == raw) {
                commands.push(raw.to_string());
            }
            if commands.len() > MAX_COMMANDS {
                let excess = commands.len() - MAX_COMMANDS;
                commands.drain(..excess);
            }
        }
        self.persist()
    }

    /// All recorded commands, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Commands whose text contains `query` case-insensitively, sorted by
    /// length ascending. An empty query returns everything unsorted.
    pub fn filter(&self, query: &str) -> Vec<String> {
        filter_commands(self.commands(), query)
    }

    fn persist(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let file = StoreFile {
            history: HistorySection {
                commands: self.lock().clone(),
            },
        };
        let data = serde_json::to_vec(&file).context("serializing history store")?;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Case-insensitive substring filter; matches come back sorted by length,
/// shortest first. An empty filter passes the input through untouched.
pub fn filter_commands(options: Vec<String>, filter: &str) -> Vec<String> {
    if filter.is_empty() {
        return options;
    }
    let needle = filter.to_lowercase();
    let mut results: Vec<String> = options
        .into_iter()
        .filter(|option| option.to_lowercase().contains(&needle))
        .collect();
    results.sort_by_key(String::len);
    results
}

/// A recorded command decomposed into its `-flag=value` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    /// Stable identity: the raw text with spaces removed.
    pub id: String,
    pub raw: String,
    pub flags: BTreeMap<String, String>,
}

impl HistoryItem {
    /// Decompose a raw command. Tokens without a `=` carry no value and
    /// are skipped; flag names lose their leading dashes.
    pub fn parse(raw: &str) -> Self {
        let mut flags = BTreeMap::new();
        for token in raw.split_whitespace() {
            if let Some((flag, value)) = token.split_once('=') {
                let name = flag.trim_start_matches('-');
                if !name.is_empty() {
                    flags.insert(name.to_string(), value.to_string());
                }
            }
        }
        Self {
            id: raw.replace(' ', ""),
            raw: raw.to_string(),
            flags,
        }
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    pub fn project(&self) -> Option<&str> {
        self.flag("project")
    }

    pub fn proxy_type(&self) -> Option<&str> {
        self.flag("proxy_type")
    }

    pub fn local_port(&self) -> Option<u16> {
        self.flag("local_port").and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_case_insensitive_and_sorted_by_length() {
        let options = vec![
            "-project=long-project-name -proxy_type=pod".to_string(),
            "-project=Abc".to_string(),
            "-cluster=xyz".to_string(),
        ];
        let results = filter_commands(options, "ABC");
        assert_eq!(results, vec!["-project=Abc".to_string()]);

        let options = vec!["bbbb".to_string(), "ab".to_string(), "abc".to_string()];
        assert_eq!(filter_commands(options, "b"), vec!["ab", "abc", "bbbb"]);
    }

    #[test]
    fn empty_filter_passes_everything_through() {
        let options = vec!["zzzz".to_string(), "a".to_string()];
        assert_eq!(filter_commands(options.clone(), ""), options);
    }

    #[test]
    fn append_dedupes_and_keeps_first_position() {
        let store = HistoryStore::ephemeral();
        store.append("a").unwrap();
        store.append("b").unwrap();
        store.append("a").unwrap();
        assert_eq!(store.commands(), vec!["a", "b"]);
    }

    #[test]
    fn append_caps_at_the_limit() {
        let store = HistoryStore::ephemeral();
        for i in 0..MAX_COMMANDS + 10 {
            store.append(&format!("cmd-{i}")).unwrap();
        }
        let commands = store.commands();
        assert_eq!(commands.len(), MAX_COMMANDS);
        assert_eq!(commands[0], "cmd-10");
        assert_eq!(commands[MAX_COMMANDS - 1], format!("cmd-{}", MAX_COMMANDS + 9));
    }

    #[test]
    fn store_round_trips_through_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.json");
        {
            let store = HistoryStore::open(&path).unwrap();
            store.append("-project=p -local_port=5432").unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.commands(), vec!["-project=p -local_port=5432"]);

        let bytes = std::fs::read(&path).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["history"]["commands"].is_array());
    }

    #[test]
    fn parse_extracts_flags_and_identity() {
        let item = HistoryItem::parse(
            "-project=prj -cluster=c1 -namespace=ns -pod=api -local_port=8081 -proxy_type=pod",
        );
        assert_eq!(item.project(), Some("prj"));
        assert_eq!(item.proxy_type(), Some("pod"));
        assert_eq!(item.flag("cluster"), Some("c1"));
        assert_eq!(item.flag("pod"), Some("api"));
        assert_eq!(item.local_port(), Some(8081));
        assert_eq!(
            item.id,
            "-project=prj-cluster=c1-namespace=ns-pod=api-local_port=8081-proxy_type=pod"
        );
    }

    #[test]
    fn parse_skips_malformed_tokens() {
        let item = HistoryItem::parse("-project=p --no-save orphan");
        assert_eq!(item.flag("project"), Some("p"));
        assert_eq!(item.flags.len(), 1);
    }
}
