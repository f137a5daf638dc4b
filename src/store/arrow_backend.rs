use crate::errors::{QuoteHubError, Result};
use crate::models::quote::Quote;
use crate::store::backend::StoreBackend;
use arrow::array::{ArrayRef, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use arrow_array::{Array, Float64Array, Int64Array, StringArray};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 基于Arrow IPC文件的行情表，每次修改后整表重写
pub struct ArrowBackend {
    path: PathBuf,
    // 文件内容的内存副本，首次访问时加载
    rows: Mutex<Option<BTreeMap<String, Quote>>>,
}

impl ArrowBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_rows<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Quote>) -> T) -> Result<T> {
        let mut guard = self.rows.lock().await;
        if guard.is_none() {
            let quotes = read_quotes_from_arrow(&self.path)?;
            *guard = Some(quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect());
        }
        match guard.as_mut() {
            Some(rows) => Ok(f(rows)),
            None => Err(QuoteHubError::DataError("Quote table not loaded".to_string())),
        }
    }

    /// 修改副本并写回文件，写入失败时副本保持不变
    async fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, Quote>)) -> Result<()> {
        let mut guard = self.rows.lock().await;
        let mut rows = match guard.take() {
            Some(rows) => rows,
            None => read_quotes_from_arrow(&self.path)?
                .into_iter()
                .map(|q| (q.symbol.clone(), q))
                .collect(),
        };
        let backup = rows.clone();
        f(&mut rows);

        let quotes: Vec<Quote> = rows.values().cloned().collect();
        match save_quotes_to_arrow(&quotes, &self.path) {
            Ok(()) => {
                *guard = Some(rows);
                Ok(())
            }
            Err(e) => {
                *guard = Some(backup);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StoreBackend for ArrowBackend {
    async fn load_all(&self) -> Result<Vec<Quote>> {
        self.with_rows(|rows| rows.values().cloned().collect()).await
    }

    async fn upsert(&self, quotes: &[Quote]) -> Result<()> {
        self.mutate(|rows| {
            for quote in quotes {
                rows.insert(quote.symbol.clone(), quote.clone());
            }
        })
        .await
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.mutate(|rows| {
            rows.remove(symbol);
        })
        .await
    }

    async fn delete_all(&self) -> Result<()> {
        self.mutate(|rows| rows.clear()).await
    }
}

fn quote_schema() -> Schema {
    let f64_field = |name: &str| Field::new(name, DataType::Float64, false);
    let i64_field = |name: &str| Field::new(name, DataType::Int64, false);
    Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("exchange", DataType::Utf8, false),
        f64_field("price"),
        f64_field("change"),
        f64_field("change_percent"),
        f64_field("day_high"),
        f64_field("day_low"),
        f64_field("year_high"),
        f64_field("year_low"),
        i64_field("volume"),
        i64_field("avg_volume"),
        f64_field("fifty_day_average"),
        f64_field("two_hundred_day_average"),
        i64_field("market_cap"),
        f64_field("open"),
        f64_field("previous_close"),
        f64_field("eps"),
        f64_field("pe"),
        Field::new("earnings_timestamp", DataType::Int64, true),
        i64_field("shares_outstanding"),
        i64_field("timestamp"),
    ])
}

/// 将行情转换为Arrow记录批次
pub fn quotes_to_record_batch(quotes: &[Quote]) -> Result<RecordBatch> {
    let mut symbol_builder = StringBuilder::new();
    let mut name_builder = StringBuilder::new();
    let mut exchange_builder = StringBuilder::new();
    for quote in quotes {
        symbol_builder.append_value(&quote.symbol);
        name_builder.append_value(&quote.name);
        exchange_builder.append_value(&quote.exchange);
    }

    let f64_col = |f: fn(&Quote) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(quotes.iter().map(f).collect::<Vec<_>>()))
    };
    let i64_col = |f: fn(&Quote) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(quotes.iter().map(f).collect::<Vec<_>>()))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(symbol_builder.finish()),
        Arc::new(name_builder.finish()),
        Arc::new(exchange_builder.finish()),
        f64_col(|q| q.price),
        f64_col(|q| q.change),
        f64_col(|q| q.change_percent),
        f64_col(|q| q.day_high),
        f64_col(|q| q.day_low),
        f64_col(|q| q.year_high),
        f64_col(|q| q.year_low),
        i64_col(|q| q.volume),
        i64_col(|q| q.avg_volume),
        f64_col(|q| q.fifty_day_average),
        f64_col(|q| q.two_hundred_day_average),
        i64_col(|q| q.market_cap),
        f64_col(|q| q.open),
        f64_col(|q| q.previous_close),
        f64_col(|q| q.eps),
        f64_col(|q| q.pe),
        Arc::new(Int64Array::from(
            quotes.iter().map(|q| q.earnings_timestamp).collect::<Vec<_>>(),
        )),
        i64_col(|q| q.shares_outstanding),
        i64_col(|q| q.timestamp),
    ];

    Ok(RecordBatch::try_new(Arc::new(quote_schema()), columns)?)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|a| a.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| QuoteHubError::DataError(format!("Missing column {}", name)))
}

fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|a| a.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| QuoteHubError::DataError(format!("Missing column {}", name)))
}

fn i64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|a| a.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| QuoteHubError::DataError(format!("Missing column {}", name)))
}

/// 从记录批次解析行情
pub fn record_batch_to_quotes(batch: &RecordBatch) -> Result<Vec<Quote>> {
    let symbol = string_column(batch, "symbol")?;
    let name = string_column(batch, "name")?;
    let exchange = string_column(batch, "exchange")?;
    let price = f64_column(batch, "price")?;
    let change = f64_column(batch, "change")?;
    let change_percent = f64_column(batch, "change_percent")?;
    let day_high = f64_column(batch, "day_high")?;
    let day_low = f64_column(batch, "day_low")?;
    let year_high = f64_column(batch, "year_high")?;
    let year_low = f64_column(batch, "year_low")?;
    let volume = i64_column(batch, "volume")?;
    let avg_volume = i64_column(batch, "avg_volume")?;
    let fifty_day_average = f64_column(batch, "fifty_day_average")?;
    let two_hundred_day_average = f64_column(batch, "two_hundred_day_average")?;
    let market_cap = i64_column(batch, "market_cap")?;
    let open = f64_column(batch, "open")?;
    let previous_close = f64_column(batch, "previous_close")?;
    let eps = f64_column(batch, "eps")?;
    let pe = f64_column(batch, "pe")?;
    let earnings_timestamp = i64_column(batch, "earnings_timestamp")?;
    let shares_outstanding = i64_column(batch, "shares_outstanding")?;
    let timestamp = i64_column(batch, "timestamp")?;

    let mut quotes = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        quotes.push(Quote {
            symbol: symbol.value(i).to_string(),
            name: name.value(i).to_string(),
            exchange: exchange.value(i).to_string(),
            price: price.value(i),
            change: change.value(i),
            change_percent: change_percent.value(i),
            day_high: day_high.value(i),
            day_low: day_low.value(i),
            year_high: year_high.value(i),
            year_low: year_low.value(i),
            volume: volume.value(i),
            avg_volume: avg_volume.value(i),
            fifty_day_average: fifty_day_average.value(i),
            two_hundred_day_average: two_hundred_day_average.value(i),
            market_cap: market_cap.value(i),
            open: open.value(i),
            previous_close: previous_close.value(i),
            eps: eps.value(i),
            pe: pe.value(i),
            earnings_timestamp: if earnings_timestamp.is_null(i) {
                None
            } else {
                Some(earnings_timestamp.value(i))
            },
            shares_outstanding: shares_outstanding.value(i),
            timestamp: timestamp.value(i),
        });
    }
    Ok(quotes)
}

/// 从Arrow文件读取行情，文件不存在时返回空表
pub fn read_quotes_from_arrow(path: &Path) -> Result<Vec<Quote>> {
    if !path.exists() {
        debug!("Quote table {} not found, starting empty", path.display());
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = FileReader::try_new(file, None)?;

    let mut result = Vec::new();
    for batch in reader {
        result.extend(record_batch_to_quotes(&batch?)?);
    }
    info!("Loaded {} quotes from {}", result.len(), path.display());
    Ok(result)
}

/// 保存行情到Arrow文件，先写临时文件再重命名
pub fn save_quotes_to_arrow(quotes: &[Quote], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let batch = quotes_to_record_batch(quotes)?;
    let tmp_path = path.with_extension("arrow.tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!("Saved {} quotes to {}", quotes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("quotehub-{}-{}", name, std::process::id()))
            .join("quotes.arrow")
    }

    fn full_quote(symbol: &str, price: f64, timestamp: i64) -> Quote {
        Quote {
            name: format!("{} Inc.", symbol),
            exchange: "NMS".to_string(),
            volume: 1_000_000,
            market_cap: 2_500_000_000_000,
            earnings_timestamp: Some(1_721_900_000_000),
            pe: 31.5,
            ..Quote::new(symbol, price, timestamp)
        }
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let path = temp_path("persist");
        let _ = fs::remove_file(&path);

        let backend = ArrowBackend::new(&path);
        backend
            .upsert(&[full_quote("AAPL", 150.0, 1), Quote::new("MSFT", 300.0, 1)])
            .await
            .unwrap();
        backend.delete("MSFT").await.unwrap();

        let reopened = ArrowBackend::new(&path);
        let quotes = reopened.load_all().await.unwrap();
        assert_eq!(quotes, vec![full_quote("AAPL", 150.0, 1)]);
        assert_eq!(quotes[0].earnings_timestamp, Some(1_721_900_000_000));

        reopened.delete_all().await.unwrap();
        assert!(ArrowBackend::new(&path).load_all().await.unwrap().is_empty());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let backend = ArrowBackend::new(temp_path("missing").join("nope.arrow"));
        assert!(backend.load_all().await.unwrap().is_empty());
    }
}
