//! Candle/indicator fetches and live price streams.
//!
//! [`Streamer::get_candles`] opens a fresh connection per request, registers
//! the symbol and any indicator studies, and drains packets into a
//! [`CandleCollector`] until it is satisfied or [`PACKET_CEILING`] is hit.
//! [`Streamer::stream_realtime_price`] re-exposes the packet channel as a
//! [`Stream`] of [`PriceUpdate`]s. [`Streamer::stream_ohlcv`] and
//! [`Streamer::stream_watchlist`] hand back the raw packet stream instead.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::{AppConfig, ExportConfig, StreamConfig};
use crate::error::TvFeedError;
use crate::export;
use crate::models::Packet;
use crate::models::candle::{CandleData, IndicatorPoint, Ohlcv};
use crate::models::quote::PriceUpdate;
use crate::models::response::{Metadata, Response};
use crate::rest::{HttpVendorApi, VendorApi};
use crate::validate::Validator;
use crate::websocket::subscription::{self, IndicatorSpec};
use crate::websocket::{Connection, PacketReceiver, StudyTable};

/// Zero-based packet index after which a candle fetch gives up and returns
/// whatever it has.
pub const PACKET_CEILING: usize = 16;

/// A `du` study array must hold more than this many points to count.
///
/// Vendor quirk: smaller arrays are incremental ticks rather than the
/// initial history burst. The threshold is empirical.
pub const STUDY_BURST_MIN_POINTS: usize = 10;

/// Parameters of a candle fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRequest {
    pub exchange: String,
    pub symbol: String,
    /// Human timeframe, e.g. `"1h"`.
    pub timeframe: String,
    pub numb_candles: usize,
    pub indicators: Vec<IndicatorSpec>,
}

impl CandleRequest {
    /// Ten one-minute candles, no indicators.
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            timeframe: "1m".to_string(),
            numb_candles: 10,
            indicators: Vec::new(),
        }
    }

    #[must_use]
    pub fn timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }

    #[must_use]
    pub fn candles(mut self, numb_candles: usize) -> Self {
        self.numb_candles = numb_candles;
        self
    }

    #[must_use]
    pub fn indicator(
        mut self,
        script_id: impl Into<String>,
        script_version: impl Into<String>,
    ) -> Self {
        self.indicators
            .push(IndicatorSpec::new(script_id, script_version));
        self
    }
}

/// Accumulates OHLCV and indicator data for one candle fetch.
#[derive(Debug)]
pub struct CandleCollector {
    studies: StudyTable,
    target_candles: usize,
    target_indicators: usize,
    data: CandleData,
}

impl CandleCollector {
    pub fn new(studies: StudyTable, target_candles: usize, target_indicators: usize) -> Self {
        Self {
            studies,
            target_candles,
            target_indicators,
            data: CandleData::default(),
        }
    }

    /// Folds one packet into the accumulated result.
    ///
    /// A non-empty `timescale_update` replaces the candle list outright, so
    /// only the latest snapshot survives. A qualifying study array replaces
    /// the previous points for that indicator.
    pub fn ingest(&mut self, packet: &Packet) {
        match packet {
            Packet::TimescaleUpdate(entries) => {
                let candles: Vec<Ohlcv> = entries.iter().filter_map(Ohlcv::from_entry).collect();
                if !candles.is_empty() {
                    self.data.ohlcv = candles;
                }
            }
            Packet::StudyUpdate(studies) => {
                for study in studies {
                    if !study.study_id.starts_with("st") {
                        continue;
                    }
                    let Some(name) = self.studies.name_for(&study.study_id) else {
                        continue;
                    };
                    if study.entries.len() <= STUDY_BURST_MIN_POINTS {
                        debug!(
                            study_id = study.study_id,
                            points = study.entries.len(),
                            "Ignoring partial study update"
                        );
                        continue;
                    }
                    let points = study
                        .entries
                        .iter()
                        .filter_map(IndicatorPoint::from_entry)
                        .collect();
                    self.data.indicators.insert(name.to_string(), points);
                }
            }
            Packet::QuoteDelta(_) | Packet::Heartbeat(_) | Packet::Unknown(_) => {}
        }
    }

    pub fn is_satisfied(&self) -> bool {
        let ohlcv_ready = self.data.ohlcv.len() >= self.target_candles;
        let indicators_ready =
            self.target_indicators == 0 || self.data.indicators.len() >= self.target_indicators;
        ohlcv_ready && indicators_ready
    }

    pub fn into_data(self) -> CandleData {
        self.data
    }
}

/// Drains `packets` into `collector` until it is satisfied, the stream ends,
/// or [`PACKET_CEILING`] is reached.
pub async fn collect_candles<S>(packets: &mut S, mut collector: CandleCollector) -> CandleData
where
    S: Stream<Item = Packet> + Unpin,
{
    let mut index = 0;
    while let Some(packet) = packets.next().await {
        collector.ingest(&packet);

        if collector.is_satisfied() {
            break;
        }
        if index >= PACKET_CEILING {
            warn!(
                packets = index + 1,
                ohlcv = collector.data.ohlcv.len(),
                indicators = collector.data.indicators.len(),
                "Packet ceiling reached; returning partial data"
            );
            break;
        }
        index += 1;
    }

    collector.into_data()
}

/// Live price updates for one symbol.
///
/// Ends when the socket closes. Dropping it closes the socket.
pub struct PriceStream {
    packets: PacketReceiver,
    exchange: String,
    symbol: String,
}

impl PriceStream {
    pub fn new(packets: PacketReceiver, exchange: &str, symbol: &str) -> Self {
        Self {
            packets,
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Stops the stream and waits until the socket is closed.
    pub async fn close(self) {
        self.packets.shutdown().await;
    }
}

impl Stream for PriceStream {
    type Item = PriceUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PriceUpdate>> {
        let this = self.get_mut();
        loop {
            match ready!(this.packets.poll_next_unpin(cx)) {
                Some(Packet::QuoteDelta(delta)) => {
                    return Poll::Ready(Some(PriceUpdate::from_quote(
                        delta.values,
                        &this.exchange,
                        &this.symbol,
                    )));
                }
                Some(_) => continue,
                None => return Poll::Ready(None),
            }
        }
    }
}

/// Entry point for candle fetches and live price streams.
pub struct Streamer<A = HttpVendorApi> {
    config: StreamConfig,
    export: Option<ExportConfig>,
    validator: Validator,
    api: A,
}

impl Streamer<HttpVendorApi> {
    /// Builds a streamer backed by the vendor HTTP endpoints.
    ///
    /// # Errors
    ///
    /// Returns a [`TvFeedError`](crate::TvFeedError) if the HTTP client cannot
    /// be built.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let mut streamer = Self::new(config.stream, HttpVendorApi::new()?);
        streamer.export = config.export;
        Ok(streamer)
    }
}

impl<A: VendorApi> Streamer<A> {
    pub fn new(config: StreamConfig, api: A) -> Self {
        Self {
            config,
            export: None,
            validator: Validator::default(),
            api,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = Some(export);
        self
    }

    /// Fetches OHLCV candles and optional indicator values.
    ///
    /// Never fails: errors are reported through the envelope. Running out of
    /// packets or hitting the ceiling still yields a `success` envelope with
    /// whatever was collected.
    pub async fn get_candles(&self, request: &CandleRequest) -> Response<CandleData> {
        match self.fetch_candles(request).await {
            Ok(data) => {
                info!(
                    exchange = request.exchange,
                    symbol = request.symbol,
                    ohlcv = data.ohlcv.len(),
                    indicators = data.indicators.len(),
                    "Candle fetch finished"
                );
                Response::success(
                    data,
                    Metadata {
                        exchange: request.exchange.clone(),
                        symbol: request.symbol.clone(),
                        timeframe: Some(request.timeframe.clone()),
                        numb_candles: Some(request.numb_candles),
                    },
                )
            }
            Err(e) => {
                error!("get_candles error: {e}");
                Response::failed(
                    e.to_string(),
                    Metadata {
                        exchange: request.exchange.clone(),
                        symbol: request.symbol.clone(),
                        ..Default::default()
                    },
                )
            }
        }
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> Result<CandleData> {
        self.validator.validate_exchange(&request.exchange)?;
        self.validator
            .validate_symbol(&request.exchange, &request.symbol)?;
        self.validator.validate_timeframe(&request.timeframe)?;
        self.api
            .validate_symbol(&request.exchange, &request.symbol)
            .await?;

        let exchange_symbol = format_symbol(&request.exchange, &request.symbol);
        let mut connection = Connection::open(&self.config).await?;
        let sessions = connection.sessions().clone();

        subscription::add_symbol(
            connection.writer(),
            &sessions,
            &exchange_symbol,
            &request.timeframe,
            request.numb_candles,
        )
        .await?;

        let studies = if request.indicators.is_empty() {
            StudyTable::default()
        } else {
            subscription::add_indicators(
                connection.writer(),
                &sessions,
                &self.api,
                &request.indicators,
            )
            .await?
        };

        let mut packets = connection.into_packets();
        let collector =
            CandleCollector::new(studies, request.numb_candles, request.indicators.len());
        let data = collect_candles(&mut packets, collector).await;
        packets.shutdown().await;

        if let Some(export) = &self.export {
            export::export_candles(
                export,
                &request.symbol,
                &data,
                !request.indicators.is_empty(),
            )?;
        }

        Ok(data)
    }

    /// Subscribes to live quotes for one symbol.
    ///
    /// # Errors
    ///
    /// Returns a [`TvFeedError`](crate::TvFeedError) if validation, connecting
    /// or subscribing fails. Once the stream is returned, failures simply end
    /// it.
    pub async fn stream_realtime_price(&self, exchange: &str, symbol: &str) -> Result<PriceStream> {
        self.validator.validate_exchange(exchange)?;
        self.validator.validate_symbol(exchange, symbol)?;
        self.api.validate_symbol(exchange, symbol).await?;

        let exchange_symbol = format_symbol(exchange, symbol);
        let mut connection = Connection::open(&self.config).await?;
        let quote_session = connection.sessions().quote.clone();
        subscription::add_quote_symbol(connection.writer(), &quote_session, &exchange_symbol)
            .await?;

        Ok(PriceStream::new(connection.into_packets(), exchange, symbol))
    }

    /// Streams every decoded packet for one symbol registered on both
    /// sessions with the volume study attached.
    ///
    /// Heartbeats are echoed and never yielded. Dropping the receiver closes
    /// the socket.
    ///
    /// # Errors
    ///
    /// Returns a [`TvFeedError`](crate::TvFeedError) if validation, connecting
    /// or subscribing fails.
    pub async fn stream_ohlcv(&self, exchange: &str, symbol: &str) -> Result<PacketReceiver> {
        self.validator.validate_exchange(exchange)?;
        self.validator.validate_symbol(exchange, symbol)?;

        let exchange_symbol = format_symbol(exchange, symbol);
        let mut connection = Connection::open(&self.config).await?;
        let sessions = connection.sessions().clone();
        subscription::add_ohlcv_watch(connection.writer(), &sessions, &exchange_symbol).await?;

        Ok(connection.into_packets())
    }

    /// Streams every decoded packet for a watchlist of `(exchange, symbol)`
    /// pairs on one quote session.
    ///
    /// # Errors
    ///
    /// Returns [`TvFeedError::Validation`](crate::TvFeedError::Validation) if
    /// the list is empty or any pair is invalid, or another
    /// [`TvFeedError`](crate::TvFeedError) if connecting or subscribing fails.
    pub async fn stream_watchlist(&self, symbols: &[(&str, &str)]) -> Result<PacketReceiver> {
        if symbols.is_empty() {
            return Err(TvFeedError::Validation(
                "watchlist needs at least one symbol".into(),
            ));
        }
        for (exchange, symbol) in symbols {
            self.validator.validate_exchange(exchange)?;
            self.validator.validate_symbol(exchange, symbol)?;
        }

        let exchange_symbols: Vec<String> = symbols
            .iter()
            .map(|(exchange, symbol)| format_symbol(exchange, symbol))
            .collect();
        let mut connection = Connection::open(&self.config).await?;
        let quote_session = connection.sessions().quote.clone();
        subscription::add_watchlist(connection.writer(), &quote_session, &exchange_symbols)
            .await?;

        Ok(connection.into_packets())
    }
}

/// `EXCHANGE:SYMBOL`, upper-cased.
pub fn format_symbol(exchange: &str, symbol: &str) -> String {
    format!(
        "{}:{}",
        exchange.trim().to_uppercase(),
        symbol.trim().to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudySeries;
    use crate::models::candle::SeriesEntry;
    use futures_util::stream;

    fn candles(count: i64) -> Packet {
        Packet::TimescaleUpdate(
            (0..count)
                .map(|i| SeriesEntry {
                    i,
                    v: vec![1_700_000_000.0 + i as f64 * 60.0, 1.0, 2.0, 0.5, 1.5, 10.0],
                })
                .collect(),
        )
    }

    fn study(study_id: &str, points: i64) -> Packet {
        Packet::StudyUpdate(vec![StudySeries {
            study_id: study_id.into(),
            entries: (0..points)
                .map(|i| SeriesEntry {
                    i,
                    v: vec![1_700_000_000.0 + i as f64 * 60.0, 50.0 + i as f64],
                })
                .collect(),
        }])
    }

    fn rsi_table() -> StudyTable {
        let mut table = StudyTable::default();
        table.register(0, "STD;RSI");
        table
    }

    #[test]
    fn timescale_update_replaces_previous_snapshot() {
        let mut collector = CandleCollector::new(StudyTable::default(), 10, 0);
        collector.ingest(&candles(3));
        collector.ingest(&candles(5));
        assert_eq!(collector.into_data().ohlcv.len(), 5);
    }

    #[test]
    fn empty_timescale_update_keeps_snapshot() {
        let mut collector = CandleCollector::new(StudyTable::default(), 10, 0);
        collector.ingest(&candles(3));
        collector.ingest(&Packet::TimescaleUpdate(vec![]));
        assert_eq!(collector.into_data().ohlcv.len(), 3);
    }

    #[test]
    fn small_study_bursts_are_ignored() {
        let mut collector = CandleCollector::new(rsi_table(), 0, 1);
        collector.ingest(&study("st9", 10));
        assert!(!collector.is_satisfied());

        collector.ingest(&study("st9", 11));
        assert!(collector.is_satisfied());
        let data = collector.into_data();
        assert_eq!(data.indicators["STD;RSI"].len(), 11);
        assert_eq!(data.indicators["STD;RSI"][3].values, vec![53.0]);
    }

    #[test]
    fn unregistered_studies_are_ignored() {
        let mut collector = CandleCollector::new(rsi_table(), 0, 1);
        collector.ingest(&study("st10", 20));
        assert!(collector.into_data().indicators.is_empty());
    }

    #[test]
    fn study_update_overwrites_previous_points() {
        let mut collector = CandleCollector::new(rsi_table(), 0, 1);
        collector.ingest(&study("st9", 20));
        collector.ingest(&study("st9", 12));
        assert_eq!(collector.into_data().indicators["STD;RSI"].len(), 12);
    }

    #[test]
    fn satisfied_needs_both_targets() {
        let mut collector = CandleCollector::new(rsi_table(), 3, 1);
        collector.ingest(&candles(3));
        assert!(!collector.is_satisfied());
        collector.ingest(&study("st9", 11));
        assert!(collector.is_satisfied());
    }

    #[test]
    fn collection_stops_when_satisfied() {
        let mut packets = stream::iter(vec![
            Packet::Unknown(None),
            candles(3),
            candles(5),
        ]);
        let collector = CandleCollector::new(StudyTable::default(), 3, 0);
        let data = tokio_test::block_on(collect_candles(&mut packets, collector));

        assert_eq!(data.ohlcv.len(), 3);
        assert_eq!(tokio_test::block_on(packets.count()), 1);
    }

    #[test]
    fn collection_stops_at_packet_ceiling() {
        let mut packets = stream::iter((0..30).map(|_| Packet::Unknown(None)).collect::<Vec<_>>());
        let collector = CandleCollector::new(StudyTable::default(), 3, 0);
        let data = tokio_test::block_on(collect_candles(&mut packets, collector));

        assert!(data.ohlcv.is_empty());
        assert_eq!(
            tokio_test::block_on(packets.count()),
            30 - (PACKET_CEILING + 1)
        );
    }

    #[test]
    fn collection_returns_partial_data_when_stream_ends() {
        let mut packets = stream::iter(vec![candles(2)]);
        let collector = CandleCollector::new(StudyTable::default(), 5, 0);
        let data = tokio_test::block_on(collect_candles(&mut packets, collector));
        assert_eq!(data.ohlcv.len(), 2);
    }

    #[test]
    fn request_builder_defaults() {
        let request = CandleRequest::new("BINANCE", "BTCUSDT");
        assert_eq!(request.timeframe, "1m");
        assert_eq!(request.numb_candles, 10);

        let request = request.timeframe("1h").candles(3).indicator("STD;RSI", "37.0");
        assert_eq!(request.timeframe, "1h");
        assert_eq!(request.indicators, vec![IndicatorSpec::new("STD;RSI", "37.0")]);
    }

    #[test]
    fn symbol_formatting() {
        assert_eq!(format_symbol("binance", " btcusdt "), "BINANCE:BTCUSDT");
    }
}
