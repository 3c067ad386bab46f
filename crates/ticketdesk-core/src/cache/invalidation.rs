//! Which cached queries each write makes stale.
//!
//! Every mutation the resource layer can perform is listed here, together
//! with the keys it invalidates and the message shown when it fails. New
//! writes get added to this table, not declared at the call site.

use super::manager::{CacheKey, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    CreateTicket,
    UpdateTicket,
    AssignTicket,
    DeleteTicket,
    UploadAttachment,
    DeleteAttachment,
    CreateIncident,
    UpdateIncident,
}

impl Mutation {
    pub const ALL: [Mutation; 8] = [
        Mutation::CreateTicket,
        Mutation::UpdateTicket,
        Mutation::AssignTicket,
        Mutation::DeleteTicket,
        Mutation::UploadAttachment,
        Mutation::DeleteAttachment,
        Mutation::CreateIncident,
        Mutation::UpdateIncident,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateTicket => "create_ticket",
            Mutation::UpdateTicket => "update_ticket",
            Mutation::AssignTicket => "assign_ticket",
            Mutation::DeleteTicket => "delete_ticket",
            Mutation::UploadAttachment => "upload_attachment",
            Mutation::DeleteAttachment => "delete_attachment",
            Mutation::CreateIncident => "create_incident",
            Mutation::UpdateIncident => "update_incident",
        }
    }

    /// Message shown when the server gives no usable one
    pub fn default_error_message(&self) -> &'static str {
        match self {
            Mutation::CreateTicket => "Failed to create ticket",
            Mutation::UpdateTicket => "Failed to update ticket",
            Mutation::AssignTicket => "Failed to assign ticket",
            Mutation::DeleteTicket => "Failed to delete ticket",
            Mutation::UploadAttachment => "Failed to upload attachment",
            Mutation::DeleteAttachment => "Failed to delete attachment",
            Mutation::CreateIncident => "Failed to create incident report",
            Mutation::UpdateIncident => "Failed to update incident report",
        }
    }

    /// Keys made stale by a successful write.
    ///
    /// `id` is the affected resource: the ticket for ticket and attachment
    /// writes, the incident for incident writes. Creates have no id yet.
    pub fn invalidates(&self, tenant: &str, id: Option<&str>) -> Vec<CacheKey> {
        use ResourceKind::*;

        let list = |kind| CacheKey::new(kind, tenant);
        let item = |kind| id.map(|id| CacheKey::with_id(kind, tenant, id));

        let keys: Vec<Option<CacheKey>> = match self {
            Mutation::CreateTicket => vec![Some(list(Tickets))],
            Mutation::UpdateTicket | Mutation::AssignTicket => {
                vec![item(Ticket), Some(list(Tickets))]
            }
            Mutation::DeleteTicket => vec![item(Ticket), Some(list(Tickets)), item(Attachments)],
            Mutation::UploadAttachment | Mutation::DeleteAttachment => {
                // Without a ticket id every attachment list of the tenant is suspect
                vec![item(Attachments).or_else(|| Some(list(Attachments))), item(Ticket)]
            }
            Mutation::CreateIncident => vec![Some(list(Incidents))],
            Mutation::UpdateIncident => vec![item(Incident), Some(list(Incidents))],
        };

        keys.into_iter().flatten().collect()
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
