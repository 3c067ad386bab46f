//! Data models for ticketdesk entities.
//!
//! This module contains the records exchanged with the REST backend:
//!
//! - `User`, `Role`: The signed-in user and the role carried in credentials
//! - `Ticket` and its request bodies (`NewTicket`, `TicketUpdate`, `AssignTicket`)
//! - `Attachment`: Files attached to a ticket
//! - `IncidentReport`: Vendor incident tracking
//!
//! Enum values travel as snake_case strings. No status transition rules are
//! enforced here; the server owns them.

pub mod attachment;
pub mod incident;
pub mod ticket;
pub mod user;

pub use attachment::Attachment;
pub use incident::{IncidentReport, IncidentStatus, IncidentUpdate, NewIncidentReport, Severity};
pub use ticket::{AssignTicket, NewTicket, Priority, Ticket, TicketStatus, TicketUpdate};
pub use user::{Role, User};
