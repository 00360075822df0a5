//! # config — อ่าน Config จาก Environment Variables
//!
//! อ่านครั้งเดียวตอน start แล้วส่งต่อเป็น struct — ไม่มี global mutable state

use std::time::Duration;

use anyhow::Context;

use crate::candle::Timeframe;
use crate::exchange::Provider;

/// Timeframes ที่เฝ้าดู — sweep ตามลำดับนี้ทุกรอบ
pub const TIMEFRAMES: [Timeframe; 5] = [
    Timeframe::M1,
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::H1,
    Timeframe::H4,
];

/// ตาราง fallback: ลอง provider บนสุดก่อน ไล่ symbol ในแต่ละ provider ตามลำดับ
pub const SYMBOL_CANDIDATES: &[(Provider, &[&str])] = &[
    (Provider::Bybit, &["BTC/USDT"]),
    (Provider::Okx, &["BTC/USDT", "BTC-USDT"]),
    (Provider::Kraken, &["BTC/USDT", "XBT/USDT", "BTC/USD", "XBT/USD"]),
    (Provider::BinanceUs, &["BTC/USDT", "BTC/USD"]),
    (Provider::Coinbase, &["BTC/USD", "BTC/USDT"]),
];

/// จำนวนแท่งที่ดึงต่อ timeframe (window สำหรับคำนวณ RSI)
pub const CANDLES_LIMIT: u32 = 200;

/// ความยาว RSI (Wilder, 14 periods)
pub const RSI_LEN: usize = 14;

/// Config ทั้งหมดที่ watcher ต้องการ
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (`None` = dry-run mode, log แทนการส่งจริง)
    pub bot_token: Option<String>,
    /// Telegram chat id ปลายทาง
    pub chat_id: Option<String>,
    /// ส่ง DM ตอน start / เลือก exchange สำเร็จหรือไม่
    pub startup_dm: bool,
    /// งบเวลาของ run นี้ (process ถูกปลุกซ้ำโดย scheduler ภายนอก)
    pub run_budget: Duration,
    /// หลับระหว่าง sweep
    pub sweep_sleep: Duration,
    /// Cooldown ต่อ timeframe ต่อ side
    pub cooldown: chrono::Duration,
    /// เส้น oversold — RSI ต่ำกว่านี้ = Below
    pub low_thresh: f64,
    /// เส้น overbought — RSI สูงกว่านี้ = Above
    pub high_thresh: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let run_secs: u64 = std::env::var("RUN_SECONDS")
            .unwrap_or_else(|_| "240".to_string())
            .parse()
            .context("RUN_SECONDS must be a number")?;

        let sleep_secs: u64 = std::env::var("LOOP_SLEEP_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("LOOP_SLEEP_SECS must be a number")?;

        Ok(Self {
            bot_token: std::env::var("BOT_TOKEN").ok().filter(|v| !v.is_empty()),
            chat_id: std::env::var("CHAT_ID").ok().filter(|v| !v.is_empty()),
            startup_dm: std::env::var("STARTUP_DM")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            run_budget: Duration::from_secs(run_secs),
            sweep_sleep: Duration::from_secs(sleep_secs),
            cooldown: chrono::Duration::seconds(env_i64("ALERT_COOLDOWN_SECS", 300)),
            low_thresh: env_f64("RSI_LOW_THRESH", 20.0),
            high_thresh: env_f64("RSI_HIGH_THRESH", 80.0),
        })
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
