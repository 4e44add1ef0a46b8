//! Wi-Fi / Zigbee frequency overlap scoring and channel recommendation.
//!
//! Both technologies share the 2.4 GHz band. A Wi-Fi channel occupies about
//! 22 MHz while a Zigbee channel occupies about 2 MHz, so a Zigbee channel
//! suffers interference from any access point whose centre frequency lies
//! within 22 MHz of its own.
//!
//! # Example
//!
//! ```
//! use zigsight_core::frequency::{overlap_factor, recommend};
//! use zigsight_types::WifiAccessPoint;
//!
//! // Wi-Fi channel 1 is far away from Zigbee channel 25.
//! assert_eq!(overlap_factor(1, 25, -50.0), 0.0);
//!
//! let recommendation = recommend(&[WifiAccessPoint::new(1, -40.0)]);
//! assert_ne!(recommendation.recommended_channel, 11);
//! ```

use std::collections::BTreeMap;
use std::fmt::Write;

use zigsight_types::{ChannelRecommendation, WifiAccessPoint};

/// Zigbee channels evaluated by [`recommend`], in tie-break order.
pub const CANDIDATE_CHANNELS: [u8; 4] = [11, 15, 20, 25];

/// Channel recommended when no Wi-Fi data is available.
pub const DEFAULT_CHANNEL: u8 = 25;

/// Signal strength assumed for access points without an RSSI, in dBm.
pub const DEFAULT_RSSI: f64 = -90.0;

/// Frequency distance beyond which channels do not interfere, in MHz.
pub const MAX_OVERLAP_MHZ: u32 = 22;

/// Signal range mapped onto the 0-100 strength scale, in dBm.
const RSSI_FLOOR: f64 = -90.0;
const RSSI_SPAN: f64 = 60.0;

/// Number of Wi-Fi channels listed in an explanation.
const SUMMARY_CHANNELS: usize = 5;

/// Centre frequency of a 2.4 GHz Wi-Fi channel in MHz.
///
/// ```
/// use zigsight_core::frequency::wifi_channel_frequency;
///
/// assert_eq!(wifi_channel_frequency(1), Some(2412));
/// assert_eq!(wifi_channel_frequency(14), Some(2484));
/// assert_eq!(wifi_channel_frequency(15), None);
/// ```
pub fn wifi_channel_frequency(channel: u8) -> Option<u32> {
    match channel {
        1..=13 => Some(2412 + 5 * (u32::from(channel) - 1)),
        14 => Some(2484),
        _ => None,
    }
}

/// Centre frequency of a Zigbee channel in MHz.
///
/// ```
/// use zigsight_core::frequency::zigbee_channel_frequency;
///
/// assert_eq!(zigbee_channel_frequency(11), Some(2405));
/// assert_eq!(zigbee_channel_frequency(26), Some(2480));
/// assert_eq!(zigbee_channel_frequency(10), None);
/// ```
pub fn zigbee_channel_frequency(channel: u8) -> Option<u32> {
    match channel {
        11..=26 => Some(2405 + 5 * (u32::from(channel) - 11)),
        _ => None,
    }
}

/// Interference caused by one access point on a Zigbee channel, 0-100.
///
/// Unknown channels and channels more than [`MAX_OVERLAP_MHZ`] apart do not
/// interfere. Otherwise the spectral overlap is scaled by the access point's
/// signal strength mapped from [-90, -30] dBm onto [0, 100].
pub fn overlap_factor(wifi_channel: u8, zigbee_channel: u8, rssi: f64) -> f64 {
    let (Some(wifi), Some(zigbee)) = (
        wifi_channel_frequency(wifi_channel),
        zigbee_channel_frequency(zigbee_channel),
    ) else {
        return 0.0;
    };

    let distance = wifi.abs_diff(zigbee);
    if distance > MAX_OVERLAP_MHZ {
        return 0.0;
    }

    let overlap = (1.0 - f64::from(distance) / f64::from(MAX_OVERLAP_MHZ)).max(0.0);
    let strength = ((rssi - RSSI_FLOOR) * 100.0 / RSSI_SPAN).clamp(0.0, 100.0);
    if strength.is_nan() {
        return 0.0;
    }
    overlap * strength
}

/// Aggregate interference on a Zigbee channel, capped at 100.
///
/// Access points without a channel are skipped.
pub fn score_channel(zigbee_channel: u8, access_points: &[WifiAccessPoint]) -> f64 {
    let total: f64 = access_points
        .iter()
        .filter(|ap| ap.channel != 0)
        .map(|ap| overlap_factor(ap.channel, zigbee_channel, ap.rssi.unwrap_or(DEFAULT_RSSI)))
        .sum();
    total.min(100.0)
}

/// Recommend the least congested candidate Zigbee channel.
///
/// Ties resolve to the lowest channel number.
pub fn recommend(access_points: &[WifiAccessPoint]) -> ChannelRecommendation {
    if access_points.is_empty() {
        return ChannelRecommendation {
            recommended_channel: DEFAULT_CHANNEL,
            scores: CANDIDATE_CHANNELS.iter().map(|ch| (*ch, 0.0)).collect(),
            explanation: "No Wi-Fi interference data available. \
                          Defaulting to Zigbee channel 25 (common default)."
                .to_string(),
        };
    }

    let mut scores = BTreeMap::new();
    let mut best = (CANDIDATE_CHANNELS[0], f64::INFINITY);
    for channel in CANDIDATE_CHANNELS {
        let score = score_channel(channel, access_points);
        scores.insert(channel, score);
        if score < best.1 {
            best = (channel, score);
        }
    }
    let (best_channel, best_score) = best;

    ChannelRecommendation {
        recommended_channel: best_channel,
        scores,
        explanation: explain(access_points, best_channel, best_score),
    }
}

fn explain(access_points: &[WifiAccessPoint], channel: u8, score: f64) -> String {
    let mut per_channel: BTreeMap<u8, usize> = BTreeMap::new();
    for ap in access_points.iter().filter(|ap| ap.channel != 0) {
        *per_channel.entry(ap.channel).or_default() += 1;
    }

    let summary = per_channel
        .iter()
        .take(SUMMARY_CHANNELS)
        .map(|(ch, count)| format!("Ch{} ({} APs)", ch, count))
        .collect::<Vec<_>>()
        .join(", ");

    let mut explanation = String::new();
    let _ = write!(
        explanation,
        "Analyzed {} Wi-Fi access points on channels: {}. \
         Zigbee channel {} has the lowest interference score ({:.1}/100). ",
        access_points.len(),
        summary,
        channel,
        score
    );

    explanation.push_str(if score < 20.0 {
        "This channel has minimal Wi-Fi interference."
    } else if score < 50.0 {
        "This channel has moderate Wi-Fi interference."
    } else {
        "All channels have significant interference; this is the best available option."
    });
    explanation
}
