use reqwest::Method;

use crate::api::ApiRequest;
use crate::cache::{CacheKey, Mutation, ResourceKind};
use crate::models::{IncidentReport, IncidentUpdate, NewIncidentReport};

use super::{Desk, DeskError};

impl Desk {
    pub async fn incidents(&self, tenant: &str) -> Result<Vec<IncidentReport>, DeskError> {
        let key = CacheKey::new(ResourceKind::Incidents, tenant);
        self.query(key, ApiRequest::get(format!("/{}/incidents", tenant)))
            .await
    }

    pub async fn incident(&self, tenant: &str, id: &str) -> Result<IncidentReport, DeskError> {
        let key = CacheKey::with_id(ResourceKind::Incident, tenant, id);
        self.query(key, ApiRequest::get(format!("/{}/incidents/{}", tenant, id)))
            .await
    }

    pub async fn create_incident(&self, tenant: &str, report: &NewIncidentReport) -> Result<IncidentReport, DeskError> {
        let mutation = Mutation::CreateIncident;
        let request = ApiRequest::new(Method::POST, format!("/{}/incidents", tenant))
            .json(report)
            .map_err(|e| self.fail(mutation, e.into()))?;
        self.mutate(mutation, tenant, None, request).await
    }

    pub async fn update_incident(&self, tenant: &str, id: &str, update: &IncidentUpdate) -> Result<IncidentReport, DeskError> {
        let mutation = Mutation::UpdateIncident;
        let request = ApiRequest::new(Method::PATCH, format!("/{}/incidents/{}", tenant, id))
            .json(update)
            .map_err(|e| self.fail(mutation, e.into()))?;
        self.mutate(mutation, tenant, Some(id), request).await
    }
}
