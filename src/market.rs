//! # market — เลือก exchange + ดึง RSI
//!
//! ไล่ probe ตามตาราง fallback จนเจอ `(provider, symbol)` ที่คืนแท่งเทียน
//! ใช้งานได้จริง แล้วผูกเป็น [`MarketBinding`] — failover กลาง run
//! ก็วนกลับเข้า selector ตัวเดิม

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::candle::{Candle, Timeframe};
use crate::config::{CANDLES_LIMIT, RSI_LEN, SYMBOL_CANDIDATES};
use crate::error::WatchError;
use crate::exchange::Provider;
use crate::rsi;

/// Probe ใช้ window จิ๋วบน timeframe ละเอียดสุด — แค่พิสูจน์ว่า endpoint มีชีวิต
const PROBE_LIMIT: u32 = 10;
/// คั่นจังหวะระหว่าง attempt กัน rate limit
const PROBE_PAUSE: Duration = Duration::from_secs(1);

// ─── Market binding ───────────────────────────────────────────────────────────

/// คู่ `(provider, symbol)` ที่ probe ผ่านแล้ว — แทนที่ทั้งก้อนตอน failover
/// (state ต่อ timeframe ไม่เกี่ยวกับ binding และอยู่รอดข้าม failover)
#[derive(Debug, Clone)]
pub struct MarketBinding {
    pub provider: Provider,
    /// Unified symbol เช่น `"BTC/USDT"` — แปลงเป็นรูป native ต่อ request
    pub symbol: String,
}

impl std::fmt::Display for MarketBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.provider, self.symbol)
    }
}

// ─── Selector ─────────────────────────────────────────────────────────────────

/// ไล่ probe ตาม [`SYMBOL_CANDIDATES`] ตามลำดับ คืนคู่แรกที่ใช้งานได้
///
/// - โหลด market metadata ต่อ provider แบบ warn-only ก่อนไล่ symbol
/// - ล้มทุกคู่ → [`WatchError::NoMarketAvailable`] พร้อม error ล่าสุดที่เจอ
pub async fn pick_working_market(client: &reqwest::Client) -> Result<MarketBinding, WatchError> {
    select_market(
        SYMBOL_CANDIDATES,
        PROBE_PAUSE,
        |provider| async move { provider.load_markets(client).await },
        |provider, symbol| async move {
            provider
                .fetch_candles(client, symbol, Timeframe::M1, PROBE_LIMIT)
                .await
        },
    )
    .await
}

/// แกนของ selector แยกจาก I/O จริง — test ฉีด probe ปลอมเข้ามาได้
async fn select_market<L, LFut, P, PFut>(
    candidates: &'static [(Provider, &'static [&'static str])],
    probe_pause: Duration,
    mut load_markets: L,
    mut probe: P,
) -> Result<MarketBinding, WatchError>
where
    L: FnMut(Provider) -> LFut,
    LFut: Future<Output = Result<(), WatchError>>,
    P: FnMut(Provider, &'static str) -> PFut,
    PFut: Future<Output = Result<Vec<Candle>, WatchError>>,
{
    let mut last_err: Option<WatchError> = None;

    for (provider, symbols) in candidates {
        if let Err(e) = load_markets(*provider).await {
            warn!(provider = provider.id(), error = %e, "load_markets warn");
        }

        for &symbol in *symbols {
            match probe(*provider, symbol).await {
                Ok(candles) if !candles.is_empty() => {
                    info!(provider = provider.id(), symbol, "Using market");
                    return Ok(MarketBinding {
                        provider: *provider,
                        symbol: symbol.to_string(),
                    });
                }
                Ok(_) => {
                    warn!(provider = provider.id(), symbol, "Probe returned no candles");
                    last_err = Some(WatchError::InsufficientData { got: 0, need: 1 });
                    tokio::time::sleep(probe_pause).await;
                }
                Err(e) => {
                    warn!(provider = provider.id(), symbol, error = %e, "Probe failed");
                    last_err = Some(e);
                    tokio::time::sleep(probe_pause).await;
                }
            }
        }

        // พักระหว่าง provider ด้วย — บางเจ้า ban IP ที่ยิงถี่
        tokio::time::sleep(probe_pause).await;
    }

    Err(WatchError::NoMarketAvailable {
        last: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidates configured".to_string()),
    })
}

// ─── Candle/RSI fetcher ───────────────────────────────────────────────────────

/// ดึง window ล่าสุดของ timeframe แล้วคืน `(RSI ของแท่งสุดท้าย, timestamp แท่งนั้น)`
///
/// แท่งสุดท้ายคือแท่งที่กำลังวิ่งอยู่ — run loop ใช้ timestamp แยก sample ซ้ำ
/// ออกจากแท่งใหม่เอง
pub async fn fetch_rsi(
    client: &reqwest::Client,
    binding: &MarketBinding,
    tf: Timeframe,
) -> Result<(f64, i64), WatchError> {
    let candles = binding
        .provider
        .fetch_candles(client, &binding.symbol, tf, CANDLES_LIMIT)
        .await?;

    let last_ts = match candles.last() {
        Some(candle) => candle.ts,
        None => {
            return Err(WatchError::InsufficientData {
                got: 0,
                need: RSI_LEN + 1,
            })
        }
    };

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let rsi = rsi::wilder_rsi(&closes, RSI_LEN).ok_or(WatchError::InsufficientData {
        got: candles.len(),
        need: RSI_LEN + 1,
    })?;

    Ok((rsi, last_ts))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
