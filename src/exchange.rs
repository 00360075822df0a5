//! # exchange — public REST kline clients
//!
//! คุยตรงกับ public endpoint ของแต่ละ exchange ผ่าน `reqwest::Client`
//! ตัวเดียวกัน แล้ว decode ให้เป็น [`Candle`] หน้าตาเดียวกันทุกเจ้า:
//! timestamp → epoch ms, เรียงเก่า → ใหม่
//!
//! ## ความต่างต่อ provider ที่ต้องเกลี่ย
//! ```text
//! bybit     — envelope {result:{list}}, แท่งใหม่อยู่หัว, ตัวเลขเป็น string
//! okx       — envelope {data}, แท่งใหม่อยู่หัว, interval code "1H"/"4H"
//! kraken    — timestamp เป็นวินาที, pair key ฝังในชื่อ result
//! binanceus — array ตรงๆ, ตัวเลขปน string
//! coinbase  — ลำดับ field [ts, low, high, open, close, vol] (!), วินาที
//! ```

use serde_json::Value;
use tracing::debug;

use crate::candle::{Candle, Timeframe};
use crate::error::WatchError;

/// Timeout ต่อ kline request
const KLINE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Timeout ต่อ metadata request (แค่เช็คว่า provider ยังหายใจ)
const MARKETS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

// ─── Provider ─────────────────────────────────────────────────────────────────

/// Exchanges the watcher can fall back across, in no particular order here —
/// the priority lives in the candidate table in [`crate::config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Bybit,
    Okx,
    Kraken,
    BinanceUs,
    Coinbase,
}

impl Provider {
    /// Short identifier used in logs and alert texts.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Bybit => "bybit",
            Provider::Okx => "okx",
            Provider::Kraken => "kraken",
            Provider::BinanceUs => "binanceus",
            Provider::Coinbase => "coinbase",
        }
    }

    /// แปลง unified symbol ("BTC/USDT") เป็นรูปแบบที่ provider ต้องการ
    fn native_symbol(&self, unified: &str) -> String {
        match self {
            Provider::Bybit | Provider::Kraken | Provider::BinanceUs => {
                unified.replace(['/', '-'], "")
            }
            Provider::Okx | Provider::Coinbase => unified.replace('/', "-"),
        }
    }

    /// รหัส interval ของแต่ละเจ้า
    fn interval_code(&self, tf: Timeframe) -> String {
        match self {
            // นาทีเพียวๆ: "1", "5", ..., "240"
            Provider::Bybit | Provider::Kraken => tf.minutes().to_string(),
            Provider::Okx => match tf {
                Timeframe::M1 => "1m",
                Timeframe::M5 => "5m",
                Timeframe::M15 => "15m",
                Timeframe::H1 => "1H",
                Timeframe::H4 => "4H",
            }
            .to_string(),
            Provider::BinanceUs => tf.label().to_string(),
            // granularity เป็นวินาที
            Provider::Coinbase => (tf.minutes() * 60).to_string(),
        }
    }

    fn kline_url(&self, unified: &str, tf: Timeframe, limit: u32) -> String {
        let sym = self.native_symbol(unified);
        let code = self.interval_code(tf);
        match self {
            Provider::Bybit => format!(
                "https://api.bybit.com/v5/market/kline?category=spot&symbol={sym}&interval={code}&limit={limit}"
            ),
            Provider::Okx => format!(
                "https://www.okx.com/api/v5/market/candles?instId={sym}&bar={code}&limit={limit}"
            ),
            // Kraken ไม่รับ limit — คืน window ใหญ่สุดของ interval นั้นมาเอง
            Provider::Kraken => {
                format!("https://api.kraken.com/0/public/OHLC?pair={sym}&interval={code}")
            }
            Provider::BinanceUs => format!(
                "https://api.binance.us/api/v3/klines?symbol={sym}&interval={code}&limit={limit}"
            ),
            // Coinbase ไม่รับ limit เช่นกัน (คืนสูงสุด 300 แท่ง)
            Provider::Coinbase => format!(
                "https://api.exchange.coinbase.com/products/{sym}/candles?granularity={code}"
            ),
        }
    }

    /// Instruments/products endpoint — ใช้แค่ validate ตอน selection
    fn markets_url(&self) -> &'static str {
        match self {
            Provider::Bybit => "https://api.bybit.com/v5/market/instruments-info?category=spot",
            Provider::Okx => "https://www.okx.com/api/v5/public/instruments?instType=SPOT",
            Provider::Kraken => "https://api.kraken.com/0/public/AssetPairs",
            Provider::BinanceUs => "https://api.binance.us/api/v3/exchangeInfo",
            Provider::Coinbase => "https://api.exchange.coinbase.com/products",
        }
    }

    // ─── Fetch ────────────────────────────────────────────────────────────────

    /// ดึง kline window ล่าสุดของ `(symbol, timeframe)` — เรียงเก่า → ใหม่
    pub async fn fetch_candles(
        &self,
        client: &reqwest::Client,
        unified: &str,
        tf: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, WatchError> {
        let url = self.kline_url(unified, tf, limit);
        debug!(provider = self.id(), %url, "Fetching klines");

        let resp = client
            .get(&url)
            .timeout(KLINE_TIMEOUT)
            .send()
            .await
            .map_err(WatchError::Exchange)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatchError::ExchangeStatus {
                provider: self.id(),
                detail: format!("HTTP {status}: {body}"),
            });
        }

        let body: Value = resp.json().await.map_err(WatchError::Exchange)?;
        self.decode_klines(&body)
    }

    /// โหลด market metadata — ความล้มเหลวไม่ fatal (ผู้เรียก warn แล้วไปต่อ)
    pub async fn load_markets(&self, client: &reqwest::Client) -> Result<(), WatchError> {
        let resp = client
            .get(self.markets_url())
            .timeout(MARKETS_TIMEOUT)
            .send()
            .await
            .map_err(WatchError::Exchange)?;

        if !resp.status().is_success() {
            return Err(WatchError::ExchangeStatus {
                provider: self.id(),
                detail: format!("markets endpoint HTTP {}", resp.status()),
            });
        }

        Ok(())
    }

    // ─── Decoding ─────────────────────────────────────────────────────────────

    fn decode_klines(&self, body: &Value) -> Result<Vec<Candle>, WatchError> {
        if let Some(detail) = self.envelope_error(body) {
            return Err(WatchError::ExchangeStatus {
                provider: self.id(),
                detail,
            });
        }

        let rows = self.kline_rows(body)?;
        let mut candles = rows
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        // บางเจ้าส่งแท่งใหม่สุดมาก่อน — เกลี่ยให้เก่า → ใหม่เสมอ
        candles.sort_by_key(|c| c.ts);
        Ok(candles)
    }

    /// บาง provider ตอบ HTTP 200 แต่ฝัง error ไว้ใน envelope
    fn envelope_error(&self, body: &Value) -> Option<String> {
        match self {
            Provider::Bybit => {
                let code = body.get("retCode").and_then(Value::as_i64).unwrap_or(-1);
                (code != 0).then(|| {
                    let msg = body.get("retMsg").and_then(Value::as_str).unwrap_or("?");
                    format!("retCode {code}: {msg}")
                })
            }
            Provider::Okx => body
                .get("code")
                .and_then(Value::as_str)
                .filter(|code| *code != "0")
                .map(|code| {
                    let msg = body.get("msg").and_then(Value::as_str).unwrap_or("?");
                    format!("code {code}: {msg}")
                }),
            Provider::Kraken => body
                .get("error")
                .and_then(Value::as_array)
                .filter(|errs| !errs.is_empty())
                .map(|errs| {
                    errs.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join("; ")
                }),
            // ทั้งสองเจ้านี้รายงาน error ผ่าน HTTP status อย่างเดียว
            Provider::BinanceUs | Provider::Coinbase => None,
        }
    }

    fn kline_rows<'a>(&self, body: &'a Value) -> Result<&'a Vec<Value>, WatchError> {
        let rows = match self {
            Provider::Bybit => body.pointer("/result/list").and_then(Value::as_array),
            Provider::Okx => body.get("data").and_then(Value::as_array),
            // result เป็น object {<pair>: [...], "last": ts} — ชื่อ pair ไม่คงที่
            Provider::Kraken => body
                .get("result")
                .and_then(Value::as_object)
                .and_then(|result| result.iter().find(|(key, _)| *key != "last"))
                .and_then(|(_, rows)| rows.as_array()),
            Provider::BinanceUs | Provider::Coinbase => body.as_array(),
        };

        rows.ok_or_else(|| self.malformed("unexpected kline envelope"))
    }

    fn decode_row(&self, row: &Value) -> Result<Candle, WatchError> {
        let cells = match row.as_array() {
            Some(cells) => cells,
            None => return Err(self.malformed("kline row is not an array")),
        };
        let cell = |i: usize| cells.get(i).and_then(cell_f64);

        let (ts, open, high, low, close, volume) = match self {
            Provider::Bybit | Provider::Okx | Provider::BinanceUs => {
                (cell(0), cell(1), cell(2), cell(3), cell(4), cell(5))
            }
            // [ts, o, h, l, c, vwap, volume, count]
            Provider::Kraken => (cell(0), cell(1), cell(2), cell(3), cell(4), cell(6)),
            // [ts, low, high, open, close, volume]
            Provider::Coinbase => (cell(0), cell(3), cell(2), cell(1), cell(4), cell(5)),
        };

        match (ts, open, high, low, close) {
            (Some(ts), Some(open), Some(high), Some(low), Some(close)) => Ok(Candle {
                ts: self.normalise_ts(ts),
                open,
                high,
                low,
                close,
                volume: volume.unwrap_or(0.0),
            }),
            _ => Err(self.malformed("kline row missing numeric OHLC fields")),
        }
    }

    /// Kraken/Coinbase รายงานเป็นวินาที — แปลงเป็น ms ให้เหมือนเจ้าอื่น
    fn normalise_ts(&self, ts: f64) -> i64 {
        match self {
            Provider::Kraken | Provider::Coinbase => (ts as i64) * 1000,
            _ => ts as i64,
        }
    }

    fn malformed(&self, detail: &str) -> WatchError {
        WatchError::MalformedPayload(format!("{}: {detail}", self.id()))
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// ตัวเลขใน kline มาได้ทั้งแบบ number และ string แล้วแต่เจ้า
fn cell_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bybit_decodes_strings_and_sorts_oldest_first() {
        let body = json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": { "list": [
                ["1700000120000", "2.0", "3.0", "1.0", "2.5", "10.0", "25.0"],
                ["1700000060000", "1.0", "2.0", "0.5", "1.5", "11.0", "16.5"]
            ]}
        });

        let candles = Provider::Bybit.decode_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].ts, 1_700_000_060_000);
        assert_eq!(candles[1].ts, 1_700_000_120_000);
        assert_eq!(candles[1].close, 2.5);
        assert_eq!(candles[0].volume, 11.0);
    }

    #[test]
    fn bybit_envelope_error_is_rejected() {
        let body = json!({ "retCode": 10001, "retMsg": "params error", "result": {} });
        let err = Provider::Bybit.decode_klines(&body).unwrap_err();
        assert!(matches!(err, WatchError::ExchangeStatus { provider: "bybit", .. }));
        assert!(err.is_source_level());
    }

    #[test]
    fn okx_envelope_error_is_rejected() {
        let body = json!({ "code": "51001", "msg": "Instrument ID does not exist", "data": [] });
        let err = Provider::Okx.decode_klines(&body).unwrap_err();
        assert!(matches!(err, WatchError::ExchangeStatus { provider: "okx", .. }));
    }

    #[test]
    fn kraken_seconds_are_normalised_to_ms() {
        let body = json!({
            "error": [],
            "result": {
                "XXBTZUSD": [
                    [1700000060, "1.0", "2.0", "0.5", "1.5", "1.2", "11.0", 42],
                    [1700000120, "2.0", "3.0", "1.0", "2.5", "2.2", "10.0", 17]
                ],
                "last": 1700000120
            }
        });

        let candles = Provider::Kraken.decode_klines(&body).unwrap();
        assert_eq!(candles[0].ts, 1_700_000_060_000);
        assert_eq!(candles[0].volume, 11.0);
        assert_eq!(candles[1].open, 2.0);
    }

    #[test]
    fn kraken_error_array_is_rejected() {
        let body = json!({ "error": ["EQuery:Unknown asset pair"] });
        let err = Provider::Kraken.decode_klines(&body).unwrap_err();
        match err {
            WatchError::ExchangeStatus { provider, detail } => {
                assert_eq!(provider, "kraken");
                assert!(detail.contains("Unknown asset pair"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn coinbase_field_order_and_seconds() {
        // [ts, low, high, open, close, volume] — newest first
        let body = json!([
            [1700000120, 1.0, 3.0, 2.0, 2.5, 10.0],
            [1700000060, 0.5, 2.0, 1.0, 1.5, 11.0]
        ]);

        let candles = Provider::Coinbase.decode_klines(&body).unwrap();
        assert_eq!(candles[0].ts, 1_700_000_060_000);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[0].high, 2.0);
        assert_eq!(candles[0].low, 0.5);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[1].open, 2.0);
    }

    #[test]
    fn binanceus_mixed_number_and_string_cells() {
        let body = json!([
            [1700000060000i64, "1.0", "2.0", "0.5", "1.5", "11.0", 1700000119999i64, "16.5", 100, "5.0", "7.5", "0"]
        ]);

        let candles = Provider::BinanceUs.decode_klines(&body).unwrap();
        assert_eq!(candles[0].ts, 1_700_000_060_000);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[0].volume, 11.0);
    }

    #[test]
    fn malformed_row_is_rejected() {
        let body = json!({ "retCode": 0, "result": { "list": [["not-a-number"]] } });
        let err = Provider::Bybit.decode_klines(&body).unwrap_err();
        assert!(matches!(err, WatchError::MalformedPayload(_)));
    }

    #[test]
    fn native_symbol_per_provider() {
        assert_eq!(Provider::Bybit.native_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(Provider::Okx.native_symbol("BTC/USDT"), "BTC-USDT");
        assert_eq!(Provider::Okx.native_symbol("BTC-USDT"), "BTC-USDT");
        assert_eq!(Provider::Kraken.native_symbol("XBT/USD"), "XBTUSD");
        assert_eq!(Provider::BinanceUs.native_symbol("BTC/USD"), "BTCUSD");
        assert_eq!(Provider::Coinbase.native_symbol("BTC/USD"), "BTC-USD");
    }

    #[test]
    fn interval_code_per_provider() {
        assert_eq!(Provider::Bybit.interval_code(Timeframe::H4), "240");
        assert_eq!(Provider::Okx.interval_code(Timeframe::H1), "1H");
        assert_eq!(Provider::Okx.interval_code(Timeframe::M5), "5m");
        assert_eq!(Provider::Kraken.interval_code(Timeframe::H1), "60");
        assert_eq!(Provider::BinanceUs.interval_code(Timeframe::M15), "15m");
        assert_eq!(Provider::Coinbase.interval_code(Timeframe::M5), "300");
    }
}
