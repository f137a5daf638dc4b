use crate::errors::Result;
use crate::models::quote::Quote;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// 以代码为键的持久化行情表
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// 读取全部记录
    async fn load_all(&self) -> Result<Vec<Quote>>;

    /// 插入或覆盖记录
    async fn upsert(&self, quotes: &[Quote]) -> Result<()>;

    async fn delete(&self, symbol: &str) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;
}

/// 纯内存实现，进程退出后数据丢失
#[derive(Default)]
pub struct MemoryBackend {
    rows: Mutex<BTreeMap<String, Quote>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quotes(quotes: Vec<Quote>) -> Self {
        let rows = quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect();
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn load_all(&self) -> Result<Vec<Quote>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn upsert(&self, quotes: &[Quote]) -> Result<()> {
        let mut rows = self.rows.lock().await;
        for quote in quotes {
            rows.insert(quote.symbol.clone(), quote.clone());
        }
        Ok(())
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.rows.lock().await.remove(symbol);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.rows.lock().await.clear();
        Ok(())
    }
}
