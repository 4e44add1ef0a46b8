//! Channel recommendation history.

use std::collections::VecDeque;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use zigsight_types::{ChannelRecommendation, WifiAccessPoint};

use crate::frequency;

/// Default number of recommendations kept.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// A recommendation together with when it was issued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedRecommendation {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub access_point_count: usize,
    #[serde(flatten)]
    pub recommendation: ChannelRecommendation,
}

/// Issues channel recommendations and remembers the most recent ones.
#[derive(Debug, Clone)]
pub struct ChannelAdvisor {
    history: VecDeque<IssuedRecommendation>,
    capacity: usize,
}

impl Default for ChannelAdvisor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl ChannelAdvisor {
    /// Create an advisor keeping at most `capacity` recommendations.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Compute a recommendation for `access_points` and record it.
    pub fn recommend(
        &mut self,
        access_points: &[WifiAccessPoint],
        now: OffsetDateTime,
    ) -> ChannelRecommendation {
        let recommendation = frequency::recommend(access_points);
        info!(
            "Recommended Zigbee channel {} from {} access points",
            recommendation.recommended_channel,
            access_points.len()
        );

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(IssuedRecommendation {
            timestamp: now,
            access_point_count: access_points.len(),
            recommendation: recommendation.clone(),
        });

        recommendation
    }

    /// The most recent recommendation.
    pub fn last(&self) -> Option<&IssuedRecommendation> {
        self.history.back()
    }

    /// Recorded recommendations, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &IssuedRecommendation> {
        self.history.iter()
    }

    /// Maximum number of recommendations kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of recommendations currently kept.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no recommendation was issued yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    #[test]
    fn test_new_advisor_is_empty() {
        let advisor = ChannelAdvisor::default();
        assert!(advisor.is_empty());
        assert!(advisor.last().is_none());
        assert_eq!(advisor.capacity(), DEFAULT_HISTORY_SIZE);
    }

    #[test]
    fn test_recommend_records_history() {
        let mut advisor = ChannelAdvisor::default();
        let rec = advisor.recommend(&[WifiAccessPoint::new(1, -40.0)], NOW);

        let last = advisor.last().unwrap();
        assert_eq!(last.recommendation, rec);
        assert_eq!(last.timestamp, NOW);
        assert_eq!(last.access_point_count, 1);
        assert_ne!(rec.recommended_channel, 11);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut advisor = ChannelAdvisor::new(3);
        for i in 0..5 {
            advisor.recommend(&[], NOW + Duration::minutes(i));
        }
        assert_eq!(advisor.len(), 3);
        let times: Vec<_> = advisor.history().map(|r| r.timestamp).collect();
        assert_eq!(
            times,
            vec![
                NOW + Duration::minutes(2),
                NOW + Duration::minutes(3),
                NOW + Duration::minutes(4)
            ]
        );
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut advisor = ChannelAdvisor::new(0);
        advisor.recommend(&[], NOW);
        advisor.recommend(&[], NOW);
        assert_eq!(advisor.len(), 1);
    }

    #[test]
    fn test_serialization_flattens_recommendation() {
        let mut advisor = ChannelAdvisor::default();
        advisor.recommend(&[], NOW);
        let value = serde_json::to_value(advisor.last().unwrap()).unwrap();
        assert_eq!(value["recommended_channel"], 25);
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(value["access_point_count"], 0);
    }
}
