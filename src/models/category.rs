//! File categories
//!
//! Every captured file belongs to exactly one category. Categories drive
//! selective restore and decide which files are encrypted by default.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// Role of a file within the durable state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Instance descriptor (`automaton.json`)
    Identity,
    /// Credential material (`wallet.json`, key files)
    Secrets,
    /// Episodic and state stores
    Memory,
    /// Persona document (`SOUL.md`)
    Soul,
    /// Installed extension definitions
    Skills,
}

impl Category {
    /// All categories in display order
    pub const ALL: [Category; 5] = [
        Category::Identity,
        Category::Secrets,
        Category::Memory,
        Category::Soul,
        Category::Skills,
    ];

    /// Lowercase name as used in manifests and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Identity => "identity",
            Category::Secrets => "secrets",
            Category::Memory => "memory",
            Category::Soul => "soul",
            Category::Skills => "skills",
        }
    }

    /// Category of everything below a top-level directory of the root
    ///
    /// Only these directories can hold durable state; the rest of the tree
    /// is never descended into.
    pub fn for_directory(name: &str) -> Option<Category> {
        match name {
            "skills" => Some(Category::Skills),
            "memory" => Some(Category::Memory),
            _ => None,
        }
    }

    /// Classify a `/`-separated path relative to the durable-state root
    ///
    /// Returns `None` for files that are not durable state (logs, caches,
    /// anything the instance regenerates on boot).
    pub fn classify(relative_path: &str) -> Option<Category> {
        let mut parts = relative_path.split('/');
        let first = parts.next()?;
        let nested = parts.next().is_some();

        if nested {
            return Category::for_directory(first);
        }

        match first {
            "automaton.json" => Some(Category::Identity),
            "wallet.json" => Some(Category::Secrets),
            "heartbeat.yml" | "state.db" | "state.db-wal" | "state.db-shm" => {
                Some(Category::Memory)
            }
            "SOUL.md" => Some(Category::Soul),
            name if name.ends_with(".key") || name.ends_with(".pem") => Some(Category::Secrets),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BackupError::Config(format!("Unknown category: {}", s)))
    }
}

/// Which categories a restore should touch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategorySelection {
    /// Every category
    #[default]
    All,
    /// Only the listed categories
    Only(BTreeSet<Category>),
}

impl CategorySelection {
    /// Select only the given categories
    pub fn only(categories: impl IntoIterator<Item = Category>) -> Self {
        Self::Only(categories.into_iter().collect())
    }

    /// Whether files of `category` are selected
    pub fn includes(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&category),
        }
    }
}

impl FromStr for CategorySelection {
    type Err = BackupError;

    /// Parse a comma-separated list; `all` anywhere selects everything
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() {
            return Err(BackupError::Config("No categories given".into()));
        }
        if names.iter().any(|n| n.eq_ignore_ascii_case("all")) {
            return Ok(Self::All);
        }

        names
            .into_iter()
            .map(Category::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self::Only)
    }
}
