//! Local report cache.
//!
//! A polling invocation that fetched a snapshot leaves its JSON report here so
//! later invocations can answer single-value items without querying the
//! database again. Files are keyed by instance address and report name.
//! Writers do not lock: the last writer wins.

use crate::config::CacheConfig;
use crate::error::{Result, SdbError};
use serde_json::Value;
use std::path::{Path, PathBuf};

const DEFAULT_CACHE_DIR_NAME: &str = "zbx-sdb";

#[derive(Debug, Clone)]
pub struct ReportCache {
    dir: PathBuf,
}

impl ReportCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        match &config.dir {
            Some(dir) => Self::new(dir),
            None => Self::new(std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, host: &str, service: u16, report: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}.json",
            sanitize(host),
            service,
            sanitize(report)
        ))
    }

    pub fn store(&self, host: &str, service: u16, report: &str, value: &Value) -> Result<()> {
        fs_err::create_dir_all(&self.dir).map_err(|source| SdbError::Io {
            context: "Failed to create cache directory".to_string(),
            source,
        })?;
        let content = serde_json::to_string(value).map_err(|source| SdbError::Json {
            context: format!("Failed to serialize {} report", report),
            source,
        })?;
        fs_err::write(self.path_for(host, service, report), content).map_err(|source| {
            SdbError::Io {
                context: format!("Failed to write {} report", report),
                source,
            }
        })
    }

    pub fn load(&self, host: &str, service: u16, report: &str) -> Result<Value> {
        let path = self.path_for(host, service, report);
        if !path.exists() {
            return Err(SdbError::CacheMiss(path.display().to_string()));
        }
        let content = fs_err::read_to_string(&path).map_err(|source| SdbError::Io {
            context: format!("Failed to read {} report", report),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SdbError::Json {
            context: format!("Cached {} report is corrupt", report),
            source,
        })
    }
}

/// Follows a dot-separated path through objects and arrays.
///
/// An empty path selects the whole value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
