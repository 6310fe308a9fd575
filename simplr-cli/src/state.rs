use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simplr_core::{
    Category, Mutation, MutationKind, QueryError, Task, TaskSnapshot, TaskSource,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Resolve the data directory: explicit flag, then `$SIMPLR_HOME`, then `~/.simplr`.
pub fn simplr_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("SIMPLR_HOME") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".simplr"))
}

pub fn ensure_simplr_home(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = simplr_home(explicit)?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// On-disk shape of the task store shared by the app and the companion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Replace `path` in one step: readers see the old file or the new one, never a prefix.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// JSON-file task store. Every committed mutation bumps `version`.
///
/// Version 0 is reserved for "no store file". The highest version ever
/// committed is also kept in a sidecar floor file, so recreating
/// `store.json` continues above it instead of starting over at 1.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    floor: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let floor = path.with_extension("version");
        Self { path, floor }
    }

    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse {}", self.path.display()))
    }

    pub fn add_task(&self, task: Task) -> Result<Mutation> {
        let mut file = self.load()?;
        if file.tasks.iter().any(|t| t.id == task.id) {
            bail!("task id already exists: {}", task.id);
        }
        file.tasks.push(task);
        self.commit(&mut file, MutationKind::TaskAdded)
    }

    /// Flip completion; stamps `completed_at` when closing.
    pub fn toggle_completion(&self, id: &str, now: DateTime<Utc>) -> Result<Mutation> {
        let mut file = self.load()?;
        let task = file
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .with_context(|| format!("no task with id {id}"))?;
        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        self.commit(&mut file, MutationKind::CompletionToggled)
    }

    pub fn remove_task(&self, id: &str) -> Result<Mutation> {
        let mut file = self.load()?;
        let before = file.tasks.len();
        file.tasks.retain(|t| t.id != id);
        if file.tasks.len() == before {
            bail!("no task with id {id}");
        }
        self.commit(&mut file, MutationKind::TaskDeleted)
    }

    /// Insert or replace a category (renames replace by id).
    pub fn upsert_category(&self, category: Category) -> Result<Mutation> {
        let mut file = self.load()?;
        match file.categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => *existing = category,
            None => file.categories.push(category),
        }
        self.commit(&mut file, MutationKind::CategoryChanged)
    }

    /// Highest version ever committed here, 0 when no floor was written yet.
    fn version_floor(&self) -> Result<u64> {
        if !self.floor.exists() {
            return Ok(0);
        }
        let s = fs::read_to_string(&self.floor)
            .with_context(|| format!("read {}", self.floor.display()))?;
        s.trim()
            .parse()
            .with_context(|| format!("parse {}", self.floor.display()))
    }

    fn commit(&self, file: &mut StoreFile, kind: MutationKind) -> Result<Mutation> {
        file.version = file.version.max(self.version_floor()?) + 1;
        // Floor first: a crash between the writes skips a version, never repeats one.
        write_atomic(&self.floor, file.version.to_string().as_bytes())?;
        let json = serde_json::to_string_pretty(file).context("serialize store")?;
        write_atomic(&self.path, json.as_bytes())?;
        tracing::info!(?kind, version = file.version, "store updated");
        Ok(Mutation {
            kind,
            version: file.version,
        })
    }
}

impl TaskSource for JsonStore {
    fn snapshot(&self) -> simplr_core::Result<TaskSnapshot> {
        let file = self
            .load()
            .map_err(|e| QueryError::Source(format!("{e:#}")))?;
        Ok(TaskSnapshot::new(
            file.version,
            file.tasks,
            file.categories,
            Utc::now(),
        ))
    }
}
