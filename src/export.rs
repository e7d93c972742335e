//! Writes fetched candles and indicator values to disk as JSON or CSV.
//!
//! Files land in the configured directory as
//! `{category}_{symbol}_{YYYYmmdd-HHMMSS}.{ext}`, one file per category.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::Result;
use crate::config::ExportConfig;
use crate::error::TvFeedError;
use crate::models::candle::{CandleData, IndicatorPoint, Ohlcv};

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = TvFeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(TvFeedError::Config(format!(
                "Invalid export type: '{s}'. Supported types: csv, json"
            ))),
        }
    }
}

/// Path of an export file for `category` and `symbol` stamped with `now`.
pub fn export_path(
    directory: &Path,
    category: &str,
    symbol: &str,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> PathBuf {
    directory.join(format!(
        "{category}_{}_{}.{}",
        symbol.to_lowercase(),
        now.format("%Y%m%d-%H%M%S"),
        format.extension()
    ))
}

/// Writes the OHLCV series, and the indicator series when requested.
///
/// Returns the paths written. The directory is created if missing.
///
/// # Errors
///
/// Returns [`TvFeedError::Io`] or [`TvFeedError::Json`] if a file cannot be
/// written.
pub fn export_candles(
    config: &ExportConfig,
    symbol: &str,
    data: &CandleData,
    include_indicators: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.directory)?;
    let now = Utc::now();
    let mut written = Vec::with_capacity(2);

    let path = export_path(&config.directory, "ohlcv", symbol, config.format, now);
    let mut writer = BufWriter::new(File::create(&path)?);
    match config.format {
        ExportFormat::Json => serde_json::to_writer_pretty(&mut writer, &data.ohlcv)?,
        ExportFormat::Csv => write_ohlcv_csv(&data.ohlcv, &mut writer)?,
    }
    writer.flush()?;
    info!(path = %path.display(), rows = data.ohlcv.len(), "Exported OHLCV");
    written.push(path);

    if include_indicators {
        let path = export_path(&config.directory, "indicators", symbol, config.format, now);
        let mut writer = BufWriter::new(File::create(&path)?);
        match config.format {
            ExportFormat::Json => serde_json::to_writer_pretty(&mut writer, &data.indicators)?,
            ExportFormat::Csv => write_indicators_csv(&data.indicators, &mut writer)?,
        }
        writer.flush()?;
        info!(
            path = %path.display(),
            indicators = data.indicators.len(),
            "Exported indicators"
        );
        written.push(path);
    }

    Ok(written)
}

fn write_ohlcv_csv<W: Write>(candles: &[Ohlcv], mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "index,timestamp,open,high,low,close,volume")?;
    for c in candles {
        let volume = c.volume.map(|v| v.to_string()).unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            c.index, c.timestamp, c.open, c.high, c.low, c.close, volume
        )?;
    }
    Ok(())
}

/// Long format: one row per indicator point, padded to the widest series.
fn write_indicators_csv<'a, W, I>(indicators: I, mut writer: W) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = (&'a String, &'a Vec<IndicatorPoint>)> + Copy,
{
    let width = indicators
        .into_iter()
        .flat_map(|(_, points)| points.iter().map(|p| p.values.len()))
        .max()
        .unwrap_or(0);

    write!(writer, "indicator,index,timestamp")?;
    for n in 0..width {
        write!(writer, ",value_{n}")?;
    }
    writeln!(writer)?;

    for (name, points) in indicators {
        for point in points {
            write!(writer, "{name},{},{}", point.index, point.timestamp)?;
            for n in 0..width {
                match point.values.get(n) {
                    Some(v) => write!(writer, ",{v}")?,
                    None => write!(writer, ",")?,
                }
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn sample() -> CandleData {
        let mut indicators = BTreeMap::new();
        indicators.insert(
            "STD;RSI".to_string(),
            vec![
                IndicatorPoint {
                    index: 0,
                    timestamp: 1_700_000_000.0,
                    values: vec![55.5],
                },
                IndicatorPoint {
                    index: 1,
                    timestamp: 1_700_000_060.0,
                    values: vec![56.25, 1.0],
                },
            ],
        );
        CandleData {
            ohlcv: vec![
                Ohlcv {
                    index: 0,
                    timestamp: 1_700_000_000.0,
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume: Some(10.0),
                },
                Ohlcv {
                    index: 1,
                    timestamp: 1_700_000_060.0,
                    open: 1.5,
                    high: 2.5,
                    low: 1.0,
                    close: 2.0,
                    volume: None,
                },
            ],
            indicators,
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        let err = "xml".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, TvFeedError::Config(_)));
    }

    #[test]
    fn path_naming() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = export_path(Path::new("out"), "ohlcv", "BTCUSDT", ExportFormat::Csv, now);
        assert_eq!(path, PathBuf::from("out/ohlcv_btcusdt_20240309-140507.csv"));
    }

    #[test]
    fn ohlcv_csv_leaves_missing_volume_blank() {
        let mut out = Vec::new();
        write_ohlcv_csv(&sample().ohlcv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "index,timestamp,open,high,low,close,volume");
        assert_eq!(lines[1], "0,1700000000,1,2,0.5,1.5,10");
        assert_eq!(lines[2], "1,1700000060,1.5,2.5,1,2,");
    }

    #[test]
    fn indicator_csv_pads_to_widest_series() {
        let mut out = Vec::new();
        write_indicators_csv(&sample().indicators, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "indicator,index,timestamp,value_0,value_1");
        assert_eq!(lines[1], "STD;RSI,0,1700000000,55.5,");
        assert_eq!(lines[2], "STD;RSI,1,1700000060,56.25,1");
    }

    #[test]
    fn writes_json_files_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            format: ExportFormat::Json,
            directory: dir.path().join("nested"),
        };

        let paths = export_candles(&config, "BTCUSDT", &sample(), true).unwrap();
        assert_eq!(paths.len(), 2);

        let ohlcv: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(ohlcv[0]["close"], 1.5);
        assert!(ohlcv[1].get("volume").is_none());

        let indicators: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(indicators["STD;RSI"][0]["0"], 55.5);
    }

    #[test]
    fn indicators_skipped_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            format: ExportFormat::Csv,
            directory: dir.path().to_path_buf(),
        };

        let paths = export_candles(&config, "ETHUSDT", &sample(), false).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(
            paths[0]
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("ohlcv_ethusdt_")
        );
    }
}
