use crate::domain::ticket::{Priority, Ticket, TicketStatus};
use std::cmp::Ordering;
use std::str::FromStr;

/// Fields available for sorting tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Subject,
    Status,
    Priority,
    Created,
    Updated,
    Comments,
}

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "id" => Ok(SortField::Id),
            "subject" => Ok(SortField::Subject),
            "status" => Ok(SortField::Status),
            "priority" => Ok(SortField::Priority),
            "created" => Ok(SortField::Created),
            "updated" => Ok(SortField::Updated),
            "comments" => Ok(SortField::Comments),
            _ => Err(format!(
                "Invalid sort field '{}'. Valid fields: id, subject, status, priority, created, updated, comments",
                s
            )),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            _ => Err(format!(
                "Invalid sort order '{}'. Valid orders: asc, desc",
                s
            )),
        }
    }
}

/// Sorts tickets in place by the given field and direction.
///
/// The sort is stable, so tickets that compare equal keep their relative
/// order. Snapshots handed to renderers are sorted newest-first with
/// `SortField::Created` or `SortField::Updated` and `SortOrder::Descending`.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use soportech_core::domain::sorting::{sort_tickets, SortField, SortOrder};
/// use soportech_core::domain::ticket::{NewTicket, Ticket, TicketId};
///
/// let now = Utc::now();
/// let mut tickets = vec![
///     Ticket::from_new(TicketId::local(1), NewTicket::new("a", "a@x", "Beta", "b"), now),
///     Ticket::from_new(TicketId::local(2), NewTicket::new("a", "a@x", "alpha", "b"), now),
/// ];
///
/// sort_tickets(&mut tickets, SortField::Subject, SortOrder::Ascending);
/// assert_eq!(tickets[0].subject, "alpha");
/// ```
pub fn sort_tickets(tickets: &mut [Ticket], field: SortField, order: SortOrder) {
    tickets.sort_by(|a, b| {
        let cmp = match field {
            SortField::Id => a.id.as_str().cmp(b.id.as_str()),
            SortField::Subject => a.subject.to_lowercase().cmp(&b.subject.to_lowercase()),
            SortField::Status => compare_status(a.status, b.status),
            SortField::Priority => compare_priority(a.priority, b.priority),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Updated => a.updated_at.cmp(&b.updated_at),
            SortField::Comments => a.comments.len().cmp(&b.comments.len()),
        };

        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
}

/// Open tickets sort before closed ones
fn compare_status(a: TicketStatus, b: TicketStatus) -> Ordering {
    fn status_order(s: TicketStatus) -> u8 {
        match s {
            TicketStatus::Open => 0,
            TicketStatus::Closed => 1,
        }
    }
    status_order(a).cmp(&status_order(b))
}

fn compare_priority(a: Priority, b: Priority) -> Ordering {
    a.cmp(&b)
}

/// Whether the slice is ordered newest-first by creation time
pub fn is_newest_first(tickets: &[Ticket]) -> bool {
    tickets
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at)
}
