//! SLA deadlines and urgency classification

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::business_hours::BusinessHours;
use crate::types::Conversation;

/// Default monitoring window before a deadline counts as at risk
pub const DEFAULT_RISK_WINDOW: Duration = Duration::minutes(60);

/// Urgency bucket for a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlaStatus {
    Ok,
    AtRisk,
    Breached,
}

impl std::str::FromStr for SlaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "atRisk" | "at_risk" => Ok(Self::AtRisk),
            "breached" => Ok(Self::Breached),
            _ => Err(format!("Invalid SLA bucket: {}", s)),
        }
    }
}

/// Business-time response targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaPolicy {
    pub hours: BusinessHours,
    pub first_response_minutes: i64,
    pub resolution_minutes: i64,
}

impl SlaPolicy {
    pub fn new(hours: BusinessHours, first_response_minutes: i64, resolution_minutes: i64) -> Self {
        Self {
            hours,
            first_response_minutes,
            resolution_minutes,
        }
    }

    pub fn first_response_deadline(&self, from: OffsetDateTime) -> OffsetDateTime {
        self.hours
            .add_business_minutes(from, self.first_response_minutes)
    }

    pub fn resolution_deadline(&self, from: OffsetDateTime) -> OffsetDateTime {
        self.hours.add_business_minutes(from, self.resolution_minutes)
    }

    /// Stamp both deadlines relative to the conversation's creation time
    pub fn apply_initial_deadlines(&self, conversation: &mut Conversation) {
        conversation.first_response_sla_at =
            Some(self.first_response_deadline(conversation.created_at));
        conversation.resolution_sla_at = Some(self.resolution_deadline(conversation.created_at));
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self::new(BusinessHours::default(), 240, 1440)
    }
}

/// Classify a conversation against whichever deadline is currently running.
///
/// Resolved conversations are always `Ok`. Until the first staff reply the
/// first-response deadline applies, afterwards the resolution deadline. A
/// conversation without the relevant deadline is `Ok`. `risk_window` is
/// wall-clock time.
pub fn classify(conversation: &Conversation, now: OffsetDateTime, risk_window: Duration) -> SlaStatus {
    if conversation.resolved_at.is_some() {
        return SlaStatus::Ok;
    }

    let deadline = if conversation.first_response_at.is_none() {
        conversation.first_response_sla_at
    } else {
        conversation.resolution_sla_at
    };

    match deadline {
        Some(deadline) if now > deadline => SlaStatus::Breached,
        Some(deadline) if deadline - now <= risk_window => SlaStatus::AtRisk,
        _ => SlaStatus::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn conversation_at(created_at: OffsetDateTime) -> Conversation {
        Conversation::new(None, created_at)
    }

    #[test]
    fn test_initial_deadlines_use_business_time() {
        let policy = SlaPolicy::new(BusinessHours::default(), 60, 480);
        let mut conv = conversation_at(datetime!(2024-01-01 17:30 UTC));
        policy.apply_initial_deadlines(&mut conv);

        assert_eq!(conv.first_response_sla_at, Some(datetime!(2024-01-02 09:30 UTC)));
        assert_eq!(conv.resolution_sla_at, Some(datetime!(2024-01-02 16:30 UTC)));
    }

    #[test]
    fn test_breached_first_response() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now - Duration::hours(2));
        conv.first_response_sla_at = Some(now - Duration::minutes(10));

        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Breached);
    }

    #[test]
    fn test_at_risk_first_response() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now - Duration::hours(2));
        conv.first_response_sla_at = Some(now + Duration::minutes(30));

        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::AtRisk);
    }

    #[test]
    fn test_risk_window_edge_is_at_risk() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now);
        conv.first_response_sla_at = Some(now + DEFAULT_RISK_WINDOW);
        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::AtRisk);

        conv.first_response_sla_at = Some(now + DEFAULT_RISK_WINDOW + Duration::seconds(1));
        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Ok);
    }

    #[test]
    fn test_deadline_instant_is_not_breached() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now);
        conv.first_response_sla_at = Some(now);
        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::AtRisk);
    }

    #[test]
    fn test_resolution_deadline_after_first_response() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now - Duration::days(1));
        conv.first_response_sla_at = Some(now - Duration::hours(5));
        conv.first_response_at = Some(now - Duration::hours(6));
        conv.resolution_sla_at = Some(now + Duration::hours(3));

        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Ok);

        conv.resolution_sla_at = Some(now - Duration::minutes(1));
        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Breached);
    }

    #[test]
    fn test_resolved_is_always_ok() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let mut conv = conversation_at(now - Duration::days(3));
        conv.first_response_sla_at = Some(now - Duration::days(2));
        conv.resolved_at = Some(now - Duration::hours(1));

        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Ok);
    }

    #[test]
    fn test_missing_deadline_is_ok() {
        let now = datetime!(2024-01-02 12:00 UTC);
        let conv = conversation_at(now - Duration::days(30));
        assert_eq!(classify(&conv, now, DEFAULT_RISK_WINDOW), SlaStatus::Ok);
    }

    #[test]
    fn test_bucket_wire_names() {
        assert_eq!(serde_json::to_string(&SlaStatus::AtRisk).unwrap(), r#""atRisk""#);
        assert_eq!("breached".parse::<SlaStatus>(), Ok(SlaStatus::Breached));
    }
}
