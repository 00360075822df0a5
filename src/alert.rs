//! # alert — Zone Classifier + Alert Decision Engine
//!
//! State machine ต่อ timeframe: ตัดสินว่า cycle นี้ควรยิง alert หรือไม่
//!
//! ## กติกาการยิง (ประเมิน Below ก่อน Above — มากสุด 1 alert ต่อ cycle)
//! ```text
//! RSI ใหม่ → classify เป็น zone
//!     │
//!     ├─ ข้ามเข้า extreme zone บนแท่งใหม่ → ยิงทันที (crossing ข้าม cooldown)
//!     ├─ ยังแช่อยู่ใน extreme zone        → ยิงซ้ำได้เมื่อพ้น cooldown (300s)
//!     └─ กลับเข้า Normal                  → ไม่ยิง
//! ```
//!
//! `zone` กับ `last_candle_ts` อัปเดตทุก cycle ไม่ว่าจะยิงหรือไม่ —
//! crossing ครั้งถัดไปต้องเทียบกับ sample ล่าสุดเสมอ

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::candle::Timeframe;
use crate::config::RSI_LEN;
use crate::exchange::Provider;

// ─── Zones ────────────────────────────────────────────────────────────────────

/// โซนของค่า RSI เทียบ threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// RSI < low threshold (oversold)
    Below,
    /// RSI > high threshold (overbought)
    Above,
    Normal,
}

/// Strict inequality เท่านั้น — ค่าตรง threshold พอดีนับเป็น Normal
pub fn classify(rsi: f64, low: f64, high: f64) -> Zone {
    if rsi < low {
        Zone::Below
    } else if rsi > high {
        Zone::Above
    } else {
        Zone::Normal
    }
}

// ─── Alert side ───────────────────────────────────────────────────────────────

/// ฝั่งของ alert — แต่ละฝั่งถือ cooldown ของตัวเอง
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Oversold,
    Overbought,
}

// ─── Per-timeframe state ──────────────────────────────────────────────────────

/// State ต่อ 1 timeframe — owned โดย run loop เท่านั้น
///
/// รอด failover: การสลับ exchange ไม่ reset zone/cooldown ใดๆ
#[derive(Debug)]
pub struct TimeframeState {
    /// Zone ของ sample ล่าสุด (เริ่มที่ Normal)
    pub zone: Zone,
    /// Timestamp (epoch ms) ของแท่งล่าสุดที่ประมวลแล้ว
    pub last_candle_ts: i64,
    /// เวลายิง alert ฝั่ง oversold ครั้งล่าสุด (`None` = ยังไม่เคย → ผ่าน cooldown เสมอ)
    pub last_alert_low: Option<DateTime<Utc>>,
    /// เวลายิง alert ฝั่ง overbought ครั้งล่าสุด
    pub last_alert_high: Option<DateTime<Utc>>,
}

impl TimeframeState {
    pub fn new() -> Self {
        Self {
            zone: Zone::Normal,
            last_candle_ts: 0,
            last_alert_low: None,
            last_alert_high: None,
        }
    }
}

impl Default for TimeframeState {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Decision parameters ──────────────────────────────────────────────────────

/// Threshold + cooldown ที่ engine ใช้ตัดสิน (สร้างครั้งเดียวจาก [`crate::config`])
#[derive(Debug, Clone)]
pub struct AlertParams {
    pub low_thresh: f64,
    pub high_thresh: f64,
    pub cooldown: chrono::Duration,
}

// ─── Decision ─────────────────────────────────────────────────────────────────

/// ประเมิน 1 sample ของ timeframe เดียว คืน `Some(side)` เมื่อต้องยิง alert
///
/// `now` ฉีดจากภายนอก — test คุมนาฬิกาได้เอง
///
/// ลำดับตามกติกา:
/// 1. crossing นับเฉพาะบนแท่งใหม่ (timestamp เปลี่ยน)
/// 2. crossing ยิงได้เสมอ ไม่สน cooldown
/// 3. แช่ใน zone เดิม → ยิงซ้ำเมื่อ `now - last_alert >= cooldown`
/// 4. อัปเดต `zone`/`last_candle_ts` เป็นขั้นตอนสุดท้าย ไม่ขึ้นกับผลการยิง
pub fn evaluate(
    state: &mut TimeframeState,
    rsi: f64,
    candle_ts: i64,
    now: DateTime<Utc>,
    params: &AlertParams,
) -> Option<Side> {
    let new_zone = classify(rsi, params.low_thresh, params.high_thresh);
    let is_new_candle = candle_ts != state.last_candle_ts;

    let crossed_below = is_new_candle && state.zone != Zone::Below && new_zone == Zone::Below;
    let crossed_above = is_new_candle && state.zone != Zone::Above && new_zone == Zone::Above;

    let can_low = state
        .last_alert_low
        .map_or(true, |t| now - t >= params.cooldown);
    let can_high = state
        .last_alert_high
        .map_or(true, |t| now - t >= params.cooldown);

    let fired = if new_zone == Zone::Below && (crossed_below || can_low) {
        state.last_alert_low = Some(now);
        Some(Side::Oversold)
    } else if new_zone == Zone::Above && (crossed_above || can_high) {
        state.last_alert_high = Some(now);
        Some(Side::Overbought)
    } else {
        debug!(?new_zone, is_new_candle, "No alert this cycle");
        None
    };

    state.zone = new_zone;
    state.last_candle_ts = candle_ts;

    fired
}

/// ข้อความ alert ตามที่ส่งเข้า Telegram
pub fn format_alert(
    side: Side,
    tf: Timeframe,
    symbol: &str,
    provider: Provider,
    rsi: f64,
    params: &AlertParams,
    now: DateTime<Utc>,
) -> String {
    let utc = now.format("%Y-%m-%d %H:%M:%S %Z");
    match side {
        Side::Oversold => format!(
            "⚠️ OVERSOLD on {tf}\n{symbol} RSI({RSI_LEN}) = {rsi:.2} (< {low:.0})\nExchange: {provider}\nUTC: {utc}",
            low = params.low_thresh,
        ),
        Side::Overbought => format!(
            "🚀 OVERBOUGHT on {tf}\n{symbol} RSI({RSI_LEN}) = {rsi:.2} (> {high:.0})\nExchange: {provider}\nUTC: {utc}",
            high = params.high_thresh,
        ),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_params() -> AlertParams {
        AlertParams {
            low_thresh: 20.0,
            high_thresh: 80.0,
            cooldown: chrono::Duration::seconds(300),
        }
    }

    /// นาฬิกาปลอม: วินาทีที่ `secs` นับจากจุดอ้างอิงคงที่
    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn classify_uses_strict_inequality() {
        assert_eq!(classify(19.99, 20.0, 80.0), Zone::Below);
        assert_eq!(classify(20.0, 20.0, 80.0), Zone::Normal);
        assert_eq!(classify(50.0, 20.0, 80.0), Zone::Normal);
        assert_eq!(classify(80.0, 20.0, 80.0), Zone::Normal);
        assert_eq!(classify(80.01, 20.0, 80.0), Zone::Above);
    }

    #[test]
    fn crossing_fires_and_bypasses_cooldown() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.last_alert_low = Some(at(-10)); // alert ล่าสุดเพิ่ง 10s ก่อน — ยังไม่พ้น cooldown

        let fired = evaluate(&mut state, 18.0, 1_000, at(0), &params);

        assert_eq!(fired, Some(Side::Oversold));
        assert_eq!(state.last_alert_low, Some(at(0)));
        assert_eq!(state.zone, Zone::Below);
        assert_eq!(state.last_candle_ts, 1_000);
    }

    #[test]
    fn in_zone_realert_gated_by_cooldown() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.zone = Zone::Below;
        state.last_candle_ts = 1_000;
        state.last_alert_low = Some(at(0));

        // แท่งใหม่ แต่ยังไม่ครบ 300s → เงียบ แต่ state ต้องอัปเดต
        let fired = evaluate(&mut state, 15.0, 2_000, at(100), &params);
        assert_eq!(fired, None);
        assert_eq!(state.zone, Zone::Below);
        assert_eq!(state.last_candle_ts, 2_000);
        assert_eq!(state.last_alert_low, Some(at(0)));

        // ครบ 300s พอดี → ยิงซ้ำได้
        let fired = evaluate(&mut state, 16.0, 3_000, at(300), &params);
        assert_eq!(fired, Some(Side::Oversold));
        assert_eq!(state.last_alert_low, Some(at(300)));
    }

    #[test]
    fn stale_candle_is_never_a_crossing() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.zone = Zone::Normal;
        state.last_candle_ts = 77;
        state.last_alert_low = Some(at(-10)); // ยังติด cooldown

        // timestamp เดิม: zone ต่างจาก state ก็ไม่นับเป็น crossing
        let fired = evaluate(&mut state, 15.0, 77, at(0), &params);
        assert_eq!(fired, None);
        assert_eq!(state.zone, Zone::Below); // แต่ zone ยังต้องตาม sample ล่าสุด
    }

    #[test]
    fn stale_candle_still_realerts_after_cooldown() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.zone = Zone::Below;
        state.last_candle_ts = 77;
        state.last_alert_low = None; // ไม่เคยยิง → cooldown ผ่านเสมอ

        let fired = evaluate(&mut state, 15.0, 77, at(0), &params);
        assert_eq!(fired, Some(Side::Oversold));
    }

    #[test]
    fn return_to_normal_never_alerts() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.zone = Zone::Below;
        state.last_candle_ts = 1_000;

        let fired = evaluate(&mut state, 50.0, 2_000, at(0), &params);
        assert_eq!(fired, None);
        assert_eq!(state.zone, Zone::Normal);

        state.zone = Zone::Above;
        let fired = evaluate(&mut state, 55.0, 3_000, at(10), &params);
        assert_eq!(fired, None);
    }

    #[test]
    fn overbought_side_is_symmetric() {
        let params = make_params();
        let mut state = TimeframeState::new();
        state.last_alert_high = Some(at(-10));

        let fired = evaluate(&mut state, 85.0, 1_000, at(0), &params);
        assert_eq!(fired, Some(Side::Overbought));
        assert_eq!(state.last_alert_high, Some(at(0)));
        assert_eq!(state.zone, Zone::Above);
    }

    #[test]
    fn four_candle_oversold_sequence() {
        // RSI [30, 18, 15, 19] บนแท่งใหม่ 4 แท่งติด:
        // Normal → crossing ยิง → แช่ (ติด cooldown) → แช่ (พ้น cooldown ยิงซ้ำ)
        let params = make_params();
        let mut state = TimeframeState::new();

        let fired = evaluate(&mut state, 30.0, 1, at(0), &params);
        assert_eq!(fired, None);
        assert_eq!(state.zone, Zone::Normal);

        let fired = evaluate(&mut state, 18.0, 2, at(30), &params);
        assert_eq!(fired, Some(Side::Oversold));
        assert_eq!(state.zone, Zone::Below);

        let fired = evaluate(&mut state, 15.0, 3, at(60), &params);
        assert_eq!(fired, None); // 30s หลัง alert — ยังไม่ครบ 300s
        assert_eq!(state.zone, Zone::Below);

        let fired = evaluate(&mut state, 19.0, 4, at(330), &params);
        assert_eq!(fired, Some(Side::Oversold)); // 300s พอดีนับว่าพ้น
        assert_eq!(state.zone, Zone::Below);
    }

    #[test]
    fn oversold_text_carries_context() {
        let params = make_params();
        let text = format_alert(
            Side::Oversold,
            Timeframe::M5,
            "BTC/USDT",
            Provider::Bybit,
            17.42,
            &params,
            at(0),
        );

        assert!(text.starts_with("⚠️ OVERSOLD on 5m"));
        assert!(text.contains("BTC/USDT RSI(14) = 17.42 (< 20)"));
        assert!(text.contains("Exchange: bybit"));
        assert!(text.contains("UTC: 2023-11-14 22:13:20 UTC"));
    }
}
