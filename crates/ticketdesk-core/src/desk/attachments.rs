use serde::de::IgnoredAny;

use crate::api::{ApiRequest, Upload};
use crate::cache::{CacheKey, Mutation, ResourceKind};
use crate::models::Attachment;

use super::{Desk, DeskError};

impl Desk {
    pub async fn attachments(&self, tenant: &str, ticket_id: &str) -> Result<Vec<Attachment>, DeskError> {
        let key = CacheKey::with_id(ResourceKind::Attachments, tenant, ticket_id);
        self.query(
            key,
            ApiRequest::get(format!("/{}/tickets/{}/attachments", tenant, ticket_id)),
        )
        .await
    }

    pub async fn upload_attachment(&self, tenant: &str, ticket_id: &str, upload: &Upload) -> Result<Attachment, DeskError> {
        let path = format!("/{}/tickets/{}/attachments", tenant, ticket_id);
        self.mutate_upload(Mutation::UploadAttachment, tenant, Some(ticket_id), &path, upload)
            .await
    }

    /// Delete an attachment. `ticket_id` names the ticket whose cached
    /// attachment list and detail go stale.
    pub async fn delete_attachment(&self, tenant: &str, ticket_id: &str, attachment_id: &str) -> Result<(), DeskError> {
        let request = ApiRequest::delete(format!("/{}/attachments/{}", tenant, attachment_id));
        let _: IgnoredAny = self
            .mutate(Mutation::DeleteAttachment, tenant, Some(ticket_id), request)
            .await?;
        Ok(())
    }
}
