use crate::errors::{QuoteHubError, Result};
use crate::models::quote::normalize_symbol;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct WatchlistFile {
    symbols: Vec<String>,
}

/// 自选列表成员的持久化，与行情数据分开保存
pub struct WatchlistRepository {
    path: Option<PathBuf>,
    symbols: Mutex<Vec<String>>,
}

impl WatchlistRepository {
    /// 从JSON文件加载，文件不存在时为空列表
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let symbols = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let file: WatchlistFile = serde_json::from_str(&text)?;
            file.symbols
        } else {
            Vec::new()
        };
        info!("Loaded watchlist with {} symbols from {}", symbols.len(), path.display());

        Ok(Self {
            path: Some(path),
            symbols: Mutex::new(symbols),
        })
    }

    /// 不落盘的列表
    pub fn in_memory(symbols: &[&str]) -> Self {
        Self {
            path: None,
            symbols: Mutex::new(symbols.iter().map(|s| normalize_symbol(s)).collect()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 追加代码，已存在时返回false
    pub fn add(&self, symbol: &str) -> Result<bool> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(QuoteHubError::DataError("Empty symbol".to_string()));
        }
        self.update(|symbols| {
            if symbols.contains(&symbol) {
                false
            } else {
                symbols.push(symbol.clone());
                true
            }
        })
    }

    /// 移除代码，不存在时返回false
    pub fn remove(&self, symbol: &str) -> Result<bool> {
        let symbol = normalize_symbol(symbol);
        self.update(|symbols| {
            let before = symbols.len();
            symbols.retain(|s| *s != symbol);
            symbols.len() != before
        })
    }

    fn update(&self, f: impl FnOnce(&mut Vec<String>) -> bool) -> Result<bool> {
        let mut symbols = self
            .symbols
            .lock()
            .map_err(|e| QuoteHubError::Unknown(e.to_string()))?;
        let mut next = symbols.clone();
        if !f(&mut next) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            save_watchlist(path, &next)?;
        }
        *symbols = next;
        Ok(true)
    }
}

fn save_watchlist(path: &Path, symbols: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = WatchlistFile {
        symbols: symbols.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}
