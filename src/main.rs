//! # rsiwatch — BTC Multi-Timeframe RSI Watcher
//!
//! Agent ตัวเดียววิ่งเป็นรอบสั้นๆ ใต้ scheduler ภายนอก (เช่น cron ของ CI)
//!
//! ## Flow
//! ```text
//! ทุก run (~4 นาที):
//!   1. เลือก exchange/symbol ที่ใช้งานได้ (fallback ตามลำดับ)
//!   2. วนทุก 30s: แต่ละ timeframe {1m 5m 15m 1h 4h}
//!        ดึงแท่ง 200 อัน → RSI(14) → classify zone → ตัดสิน alert
//!   3. ยิง alert เข้า Telegram (cooldown 300s ต่อ timeframe ต่อ side)
//!   4. หมดงบเวลา → จบ process ทิ้ง state ทั้งหมด
//! ```
//!
//! State ทุกอย่างอยู่ในหน่วยความจำของ run เดียว — ไม่มี DB ไม่มีไฟล์

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod alert;
mod candle;
mod config;
mod error;
mod exchange;
mod market;
mod notifier;
mod rsi;

use alert::{AlertParams, TimeframeState};
use candle::Timeframe;
use config::Config;
use error::WatchError;
use market::MarketBinding;
use notifier::Notifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("rsiwatch=debug".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════╗
  ║   RSIWATCH — BTC RSI Alert Watcher        ║
  ║   multi-timeframe → Telegram              ║
  ╚═══════════════════════════════════════════╝"#
    );

    let config = Config::from_env().context("Failed to load config")?;
    let client = reqwest::Client::new();
    let notifier = Notifier::new(client.clone(), &config);

    info!(
        telegram   = notifier.enabled(),
        timeframes = ?config::TIMEFRAMES.map(|tf| tf.label()),
        budget     = ?config.run_budget,
        "rsiwatch started"
    );

    if config.startup_dm {
        notifier
            .send("✅ BTC RSI watcher starting… selecting exchange.")
            .await;
    }

    // ── Initial selection (ไม่เจอสักเจ้า = fatal, exit non-zero) ──────────────
    let mut binding = market::pick_working_market(&client)
        .await
        .context("No market source available at startup")?;

    if config.startup_dm {
        let tfs: Vec<&str> = config::TIMEFRAMES.iter().map(|tf| tf.label()).collect();
        notifier
            .send(&format!("✅ Live on {binding}\nTFs: {}", tfs.join(", ")))
            .await;
    }

    // ── Per-run state (ทิ้งทั้งหมดเมื่อ process จบ) ──────────────────────────
    let params = AlertParams {
        low_thresh: config.low_thresh,
        high_thresh: config.high_thresh,
        cooldown: config.cooldown,
    };
    let mut states: HashMap<Timeframe, TimeframeState> = config::TIMEFRAMES
        .iter()
        .map(|tf| (*tf, TimeframeState::new()))
        .collect();

    // ── Sweep loop ────────────────────────────────────────────────────────────
    let started = Instant::now();
    while started.elapsed() < config.run_budget {
        match run_sweep(&client, &params, &notifier, &mut binding, &mut states).await {
            Ok(()) => {
                tokio::time::sleep(config.sweep_sleep).await;
            }
            Err(e) => {
                // re-selection กลาง sweep ก็ยังพัง — รอแล้วค่อยวนใหม่
                error!(error = %e, "Sweep failed — retrying in 30s");
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            }
        }
    }

    info!("⏱️ Time budget exhausted — run complete");
    Ok(())
}

/// กวาด 1 รอบ: ทุก timeframe → fetch → classify → decide → notify
///
/// Error ระดับ source จาก timeframe ไหนก็ตาม → พัก 10s แล้ว re-select
/// exchange ทั้งก้อน — state ของทุก timeframe อยู่ครบข้าม failover
/// (cooldown/zone ไม่ reset เพราะสลับเจ้า)
async fn run_sweep(
    client: &reqwest::Client,
    params: &AlertParams,
    notifier: &Notifier,
    binding: &mut MarketBinding,
    states: &mut HashMap<Timeframe, TimeframeState>,
) -> Result<(), WatchError> {
    for tf in config::TIMEFRAMES {
        let (rsi_val, candle_ts) = match market::fetch_rsi(client, binding, tf).await {
            Ok(sample) => sample,
            Err(e) if e.is_source_level() => {
                warn!(
                    provider = %binding.provider,
                    tf = tf.label(),
                    error = %e,
                    "Source-level fetch error — re-selecting market"
                );
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;

                // ล้มตรงนี้ = ไม่มีเจ้าไหนใช้ได้เลย → โยนให้ outer loop พักยาว
                *binding = market::pick_working_market(client).await?;
                notifier.send(&format!("🔁 Switched to {binding}")).await;
                continue; // ข้าม timeframe นี้ใน sweep นี้
            }
            Err(e) => {
                warn!(tf = tf.label(), error = %e, "Fetch error — skipping timeframe");
                continue;
            }
        };

        let Some(state) = states.get_mut(&tf) else {
            continue;
        };

        let now = chrono::Utc::now();
        let is_new_candle = candle_ts != state.last_candle_ts;
        let decision = alert::evaluate(state, rsi_val, candle_ts, now, params);

        info!(
            provider   = %binding.provider,
            symbol     = %binding.symbol,
            tf         = tf.label(),
            rsi        = rsi_val,
            zone       = ?state.zone,
            new_candle = is_new_candle,
            "Cycle"
        );

        if let Some(side) = decision {
            info!(tf = tf.label(), side = ?side, "🔔 Alert firing");
            let text = alert::format_alert(
                side,
                tf,
                &binding.symbol,
                binding.provider,
                rsi_val,
                params,
                now,
            );
            notifier.send(&text).await;
        }
    }

    Ok(())
}
