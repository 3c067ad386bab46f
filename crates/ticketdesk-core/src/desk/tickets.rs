use reqwest::Method;
use serde::de::IgnoredAny;

use crate::api::ApiRequest;
use crate::cache::{CacheKey, Mutation, ResourceKind};
use crate::models::{AssignTicket, NewTicket, Ticket, TicketStatus, TicketUpdate, User};

use super::{Desk, DeskError};

impl Desk {
    /// Tickets of a tenant, optionally filtered by status
    pub async fn tickets(&self, tenant: &str, status: Option<TicketStatus>) -> Result<Vec<Ticket>, DeskError> {
        let mut request = ApiRequest::get(format!("/{}/tickets", tenant));
        let key = match status {
            Some(status) => {
                request = request.query("status", status.as_str());
                CacheKey::with_id(ResourceKind::Tickets, tenant, format!("status={}", status.as_str()))
            }
            None => CacheKey::new(ResourceKind::Tickets, tenant),
        };
        self.query(key, request).await
    }

    pub async fn ticket(&self, tenant: &str, id: &str) -> Result<Ticket, DeskError> {
        let key = CacheKey::with_id(ResourceKind::Ticket, tenant, id);
        self.query(key, ApiRequest::get(format!("/{}/tickets/{}", tenant, id)))
            .await
    }

    /// Users a ticket can be assigned to
    pub async fn engineers(&self, tenant: &str) -> Result<Vec<User>, DeskError> {
        let key = CacheKey::new(ResourceKind::Engineers, tenant);
        self.query(key, ApiRequest::get(format!("/{}/engineers", tenant)))
            .await
    }

    pub async fn create_ticket(&self, tenant: &str, ticket: &NewTicket) -> Result<Ticket, DeskError> {
        let mutation = Mutation::CreateTicket;
        let request = ApiRequest::new(Method::POST, format!("/{}/tickets", tenant))
            .json(ticket)
            .map_err(|e| self.fail(mutation, e.into()))?;
        self.mutate(mutation, tenant, None, request).await
    }

    pub async fn update_ticket(&self, tenant: &str, id: &str, update: &TicketUpdate) -> Result<Ticket, DeskError> {
        let mutation = Mutation::UpdateTicket;
        let request = ApiRequest::new(Method::PATCH, format!("/{}/tickets/{}", tenant, id))
            .json(update)
            .map_err(|e| self.fail(mutation, e.into()))?;
        self.mutate(mutation, tenant, Some(id), request).await
    }

    /// Assign a ticket, or unassign it with `None`
    pub async fn assign_ticket(&self, tenant: &str, id: &str, assignee_id: Option<&str>) -> Result<Ticket, DeskError> {
        let mutation = Mutation::AssignTicket;
        let body = AssignTicket {
            assignee_id: assignee_id.map(str::to_string),
        };
        let request = ApiRequest::new(Method::POST, format!("/{}/tickets/{}/assign", tenant, id))
            .json(&body)
            .map_err(|e| self.fail(mutation, e.into()))?;
        self.mutate(mutation, tenant, Some(id), request).await
    }

    pub async fn delete_ticket(&self, tenant: &str, id: &str) -> Result<(), DeskError> {
        let request = ApiRequest::delete(format!("/{}/tickets/{}", tenant, id));
        let _: IgnoredAny = self
            .mutate(Mutation::DeleteTicket, tenant, Some(id), request)
            .await?;
        Ok(())
    }
}
