//! Staff conversation list: filtering, ordering and pagination

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::sla::{classify, SlaStatus};
use crate::types::{Conversation, ConversationStatus, Priority};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Mailbox-style scope of the list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mailbox {
    Unassigned,
    Mine,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    LastMessageDesc,
    TimeToBreachAsc,
}

impl std::str::FromStr for Mailbox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "mine" => Ok(Self::Mine),
            "all" => Ok(Self::All),
            _ => Err(format!("Invalid box: {}", s)),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lastMessageDesc" | "last_message_desc" => Ok(Self::LastMessageDesc),
            "timeToBreachAsc" | "time_to_breach_asc" => Ok(Self::TimeToBreachAsc),
            _ => Err(format!("Invalid sort: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub mailbox: Mailbox,
    pub status: Option<ConversationStatus>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub sla: Option<SlaStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Everything a list request needs besides the conversations themselves
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub filter: ConversationFilter,
    pub sort: SortOrder,
    pub page: u32,
    pub page_size: u32,
    pub caller_id: Uuid,
    pub now: OffsetDateTime,
    pub risk_window: Duration,
}

/// Filter, sort and paginate `conversations`.
///
/// `page` is 1-indexed and clamped to at least 1; `page_size` is clamped to
/// `1..=max_page_size`. `total_pages` never drops below 1.
pub fn list_conversations(
    conversations: Vec<Conversation>,
    request: &ListRequest,
    max_page_size: u32,
) -> Page<Conversation> {
    let needle = request
        .filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let mut matching: Vec<Conversation> = conversations
        .into_iter()
        .filter(|conv| matches_filter(conv, request, needle.as_deref()))
        .collect();

    match request.sort {
        SortOrder::LastMessageDesc => matching.sort_by(by_last_message_desc),
        SortOrder::TimeToBreachAsc => matching.sort_by(by_time_to_breach_asc),
    }

    let page_size = request.page_size.clamp(1, max_page_size.max(1));
    let page = request.page.max(1);
    let total = matching.len();
    let total_pages = (total as u64).div_ceil(u64::from(page_size)).max(1) as u32;

    let offset = (page as usize - 1).saturating_mul(page_size as usize);
    let items = matching
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();

    Page {
        items,
        total,
        page,
        page_size,
        total_pages,
    }
}

fn matches_filter(conv: &Conversation, request: &ListRequest, needle: Option<&str>) -> bool {
    let filter = &request.filter;

    let in_mailbox = match filter.mailbox {
        Mailbox::Unassigned => conv.assigned_to_id.is_none(),
        Mailbox::Mine => conv.assigned_to_id == Some(request.caller_id),
        Mailbox::All => true,
    };
    if !in_mailbox {
        return false;
    }
    if filter.status.is_some_and(|status| conv.status != status) {
        return false;
    }
    if filter.priority.is_some_and(|priority| conv.priority != priority) {
        return false;
    }
    if let Some(tag) = filter.tag.as_deref() {
        if !conv.tags.contains(tag.trim()) {
            return false;
        }
    }
    if let Some(needle) = needle {
        let hit = [&conv.subject, &conv.customer_name, &conv.customer_email]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle));
        if !hit {
            return false;
        }
    }
    if let Some(bucket) = filter.sla {
        if classify(conv, request.now, request.risk_window) != bucket {
            return false;
        }
    }
    true
}

fn recency(conv: &Conversation) -> OffsetDateTime {
    conv.last_message_at.unwrap_or(conv.created_at)
}

/// Final tiebreak shared by both orders: newest update first, then id
fn tiebreak(a: &Conversation, b: &Conversation) -> Ordering {
    b.updated_at
        .unwrap_or(b.created_at)
        .cmp(&a.updated_at.unwrap_or(a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn by_last_message_desc(a: &Conversation, b: &Conversation) -> Ordering {
    recency(b).cmp(&recency(a)).then_with(|| tiebreak(a, b))
}

/// The nearer of the two SLA deadlines, answered or not
fn nearest_deadline(conv: &Conversation) -> Option<OffsetDateTime> {
    match (conv.first_response_sla_at, conv.resolution_sla_at) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn by_time_to_breach_asc(a: &Conversation, b: &Conversation) -> Ordering {
    // Conversations still awaiting a first response sort ahead
    let answered = |c: &Conversation| c.first_response_at.is_some();
    // Missing deadlines go last
    let deadline_key = |c: &Conversation| match nearest_deadline(c) {
        Some(at) => (0, Some(at)),
        None => (1, None),
    };

    answered(a)
        .cmp(&answered(b))
        .then_with(|| deadline_key(a).cmp(&deadline_key(b)))
        .then_with(|| recency(b).cmp(&recency(a)))
        .then_with(|| tiebreak(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-01-03 12:00 UTC);

    fn request(filter: ConversationFilter, sort: SortOrder) -> ListRequest {
        ListRequest {
            filter,
            sort,
            page: 1,
            page_size: 50,
            caller_id: Uuid::nil(),
            now: NOW,
            risk_window: Duration::hours(1),
        }
    }

    fn conv(minutes_ago: i64) -> Conversation {
        let mut c = Conversation::new(Some(Uuid::new_v4()), NOW - Duration::days(1));
        c.last_message_at = Some(NOW - Duration::minutes(minutes_ago));
        c
    }

    #[test]
    fn test_mailbox_scopes() {
        let me = Uuid::new_v4();
        let mut mine = conv(1);
        mine.assigned_to_id = Some(me);
        let mut theirs = conv(2);
        theirs.assigned_to_id = Some(Uuid::new_v4());
        let unassigned = conv(3);
        let all = vec![mine.clone(), theirs, unassigned.clone()];

        let mut req = request(
            ConversationFilter {
                mailbox: Mailbox::Mine,
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        req.caller_id = me;
        let page = list_conversations(all.clone(), &req, 100);
        assert_eq!(page.items, vec![mine]);

        req.filter.mailbox = Mailbox::Unassigned;
        let page = list_conversations(all.clone(), &req, 100);
        assert_eq!(page.items, vec![unassigned]);

        req.filter.mailbox = Mailbox::All;
        assert_eq!(list_conversations(all, &req, 100).total, 3);
    }

    #[test]
    fn test_free_text_matches_subject_name_and_email() {
        let mut by_subject = conv(1);
        by_subject.subject = Some("Refund for ORDER 42".into());
        let mut by_email = conv(2);
        by_email.customer_email = Some("jo@Example.com".into());
        let mut by_name = conv(3);
        by_name.customer_name = Some("Example Person".into());
        let miss = conv(4);

        let req = request(
            ConversationFilter {
                q: Some("  example ".into()),
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        let all = vec![by_subject.clone(), by_email.clone(), by_name.clone(), miss.clone()];
        let page = list_conversations(all, &req, 100);
        assert_eq!(page.items, vec![by_email, by_name]);

        let req = request(
            ConversationFilter {
                q: Some("order 42".into()),
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        let page = list_conversations(vec![by_subject.clone(), miss], &req, 100);
        assert_eq!(page.items, vec![by_subject]);
    }

    #[test]
    fn test_status_priority_and_tag_filters() {
        let mut urgent = conv(1);
        urgent.priority = Priority::Urgent;
        urgent.tags.insert("vip".into());
        let mut pending = conv(2);
        pending.status = ConversationStatus::Pending;

        let all = vec![urgent.clone(), pending.clone()];

        let req = request(
            ConversationFilter {
                priority: Some(Priority::Urgent),
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        assert_eq!(list_conversations(all.clone(), &req, 100).items, vec![urgent.clone()]);

        let req = request(
            ConversationFilter {
                status: Some(ConversationStatus::Pending),
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        assert_eq!(list_conversations(all.clone(), &req, 100).items, vec![pending]);

        let req = request(
            ConversationFilter {
                tag: Some("vip".into()),
                ..Default::default()
            },
            SortOrder::LastMessageDesc,
        );
        assert_eq!(list_conversations(all, &req, 100).items, vec![urgent]);
    }

    #[test]
    fn test_sla_bucket_filter() {
        let mut breached = conv(1);
        breached.first_response_sla_at = Some(NOW - Duration::minutes(10));
        let mut at_risk = conv(2);
        at_risk.first_response_sla_at = Some(NOW + Duration::minutes(30));
        let mut ok = conv(3);
        ok.first_response_sla_at = Some(NOW + Duration::hours(5));

        let all = vec![breached.clone(), at_risk.clone(), ok.clone()];
        for (bucket, expected) in [
            (SlaStatus::Breached, breached),
            (SlaStatus::AtRisk, at_risk),
            (SlaStatus::Ok, ok),
        ] {
            let req = request(
                ConversationFilter {
                    sla: Some(bucket),
                    ..Default::default()
                },
                SortOrder::LastMessageDesc,
            );
            assert_eq!(list_conversations(all.clone(), &req, 100).items, vec![expected]);
        }
    }

    #[test]
    fn test_last_message_desc_order() {
        let older = conv(30);
        let newer = conv(5);
        let req = request(ConversationFilter::default(), SortOrder::LastMessageDesc);

        let page = list_conversations(vec![older.clone(), newer.clone()], &req, 100);
        assert_eq!(page.items, vec![newer, older]);
    }

    #[test]
    fn test_time_to_breach_order() {
        let mut answered_soon = conv(1);
        answered_soon.first_response_at = Some(NOW - Duration::hours(2));
        answered_soon.resolution_sla_at = Some(NOW + Duration::minutes(5));

        let mut waiting_late = conv(2);
        waiting_late.first_response_sla_at = Some(NOW + Duration::hours(4));

        let mut waiting_soon = conv(3);
        waiting_soon.first_response_sla_at = Some(NOW + Duration::hours(1));

        let waiting_no_deadline = conv(4);

        let req = request(ConversationFilter::default(), SortOrder::TimeToBreachAsc);
        let page = list_conversations(
            vec![
                answered_soon.clone(),
                waiting_no_deadline.clone(),
                waiting_late.clone(),
                waiting_soon.clone(),
            ],
            &req,
            100,
        );
        assert_eq!(
            page.items,
            vec![waiting_soon, waiting_late, waiting_no_deadline, answered_soon]
        );
    }

    #[test]
    fn test_time_to_breach_uses_nearer_deadline_for_answered() {
        // Stale first-response deadline outranks a nearer resolution deadline
        let mut stale_first_response = conv(1);
        stale_first_response.first_response_at = Some(NOW - Duration::hours(11));
        stale_first_response.first_response_sla_at = Some(NOW - Duration::hours(10));
        stale_first_response.resolution_sla_at = Some(NOW + Duration::hours(5));

        let mut resolving_soon = conv(2);
        resolving_soon.first_response_at = Some(NOW - Duration::hours(2));
        resolving_soon.first_response_sla_at = Some(NOW - Duration::hours(1));
        resolving_soon.resolution_sla_at = Some(NOW + Duration::hours(2));

        let req = request(ConversationFilter::default(), SortOrder::TimeToBreachAsc);
        let page = list_conversations(
            vec![resolving_soon.clone(), stale_first_response.clone()],
            &req,
            100,
        );
        assert_eq!(page.items, vec![stale_first_response, resolving_soon]);
    }

    #[test]
    fn test_ties_resolve_by_updated_at_then_id() {
        let mut a = conv(10);
        let mut b = conv(10);
        a.updated_at = Some(NOW - Duration::minutes(3));
        b.updated_at = Some(NOW - Duration::minutes(1));

        let req = request(ConversationFilter::default(), SortOrder::LastMessageDesc);
        let page = list_conversations(vec![a.clone(), b.clone()], &req, 100);
        assert_eq!(page.items, vec![b.clone(), a.clone()]);

        b.updated_at = a.updated_at;
        let first = list_conversations(vec![a.clone(), b.clone()], &req, 100);
        let second = list_conversations(vec![b, a], &req, 100);
        assert_eq!(first.items, second.items);
    }

    #[test]
    fn test_pagination_bounds() {
        let all: Vec<_> = (0..7).map(conv).collect();
        let mut req = request(ConversationFilter::default(), SortOrder::LastMessageDesc);
        req.page_size = 3;
        req.page = 3;

        let page = list_conversations(all.clone(), &req, 100);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 1);

        req.page = 0;
        req.page_size = 500;
        let page = list_conversations(all, &req, 100);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(page.items.len(), 7);
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let req = request(ConversationFilter::default(), SortOrder::LastMessageDesc);
        let page = list_conversations(Vec::new(), &req, 100);
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }
}
