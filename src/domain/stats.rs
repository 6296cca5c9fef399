use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::ticket::{Ticket, TicketStatus};

/// Counters shown on the technician dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    /// Tickets in neither terminal bucket; always zero with the current
    /// two-state lifecycle but kept for the dashboard layout
    pub in_progress: usize,
    /// Ticket count per assignee name, including `unassigned`
    pub by_assignee: BTreeMap<String, usize>,
}

impl TicketStats {
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        let mut stats = Self {
            total: tickets.len(),
            ..Self::default()
        };

        for ticket in tickets {
            match ticket.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::Closed => stats.closed += 1,
            }
            *stats
                .by_assignee
                .entry(ticket.assignee_name().to_string())
                .or_insert(0) += 1;
        }

        stats.in_progress = stats.total - stats.open - stats.closed;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::{Assignee, NewTicket, TicketId, TicketPatch};
    use chrono::Utc;

    #[test]
    fn test_stats_from_tickets() {
        let now = Utc::now();
        let mut tickets: Vec<Ticket> = (1..=3)
            .map(|n| {
                Ticket::from_new(
                    TicketId::local(n),
                    NewTicket::new("Ana", "ana@x.com", "s", "b"),
                    now,
                )
            })
            .collect();
        tickets[0].apply(TicketPatch::status(TicketStatus::Closed), now);
        tickets[1].apply(TicketPatch::assign(Assignee::new("Emmanuel Pilco")), now);

        let stats = TicketStats::from_tickets(&tickets);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.in_progress, 0);
        assert_eq!(stats.by_assignee.get("unassigned"), Some(&2));
        assert_eq!(stats.by_assignee.get("Emmanuel Pilco"), Some(&1));
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(TicketStats::from_tickets(&[]), TicketStats::default());
    }
}
