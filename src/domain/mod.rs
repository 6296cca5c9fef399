pub mod comment;
pub mod sorting;
pub mod stats;
pub mod ticket;

pub use comment::{Comment, CommentKind};
pub use sorting::{sort_tickets, SortField, SortOrder};
pub use stats::TicketStats;
pub use ticket::{
    Assignee, Backend, NewTicket, Priority, Requester, Ticket, TicketId, TicketPatch,
    TicketStatus,
};
