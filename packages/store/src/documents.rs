//! Saksflyt Store: Documents
//!
//! The first upload moves a Draft case to DocumentsUploaded in the same
//! transaction as the insert; extraction outcomes are written back by the
//! orchestrator.

use chrono::Utc;
use uuid::Uuid;

use saksflyt_core::evidence::ExtractedFields;
use saksflyt_core::types::{
    Actor, AuditAction, CaseStatus, ContentType, Document, DocumentStatus, DOCUMENT_TYPE_MAX,
};
use saksflyt_core::{Error, Result};

use crate::audit::insert_audit;
use crate::store::{document_from_row, fmt_ts, storage_err, Store};

/// Upload metadata for a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_type: String,
    pub original_filename: String,
    pub content_type: ContentType,
    pub size_bytes: u64,
    pub storage_key: String,
}

impl NewDocument {
    fn validate(&self) -> Result<()> {
        let ty = self.document_type.trim();
        if ty.is_empty() || ty.len() > DOCUMENT_TYPE_MAX {
            return Err(Error::invalid(
                "document_type",
                format!("length must be 1..={DOCUMENT_TYPE_MAX}"),
            ));
        }
        Ok(())
    }
}

impl Store {
    /// Attach a document to a case the actor owns or reviews.
    ///
    /// Transitions `Draft -> DocumentsUploaded` on the first upload and
    /// audits `document_uploaded`, all in one transaction.
    pub async fn add_document(
        &self,
        case_id: Uuid,
        doc: NewDocument,
        actor: Actor,
    ) -> Result<Document> {
        doc.validate()?;
        let case = self.get_case_authorized(case_id, actor).await?;
        if case.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: case.status,
                to: CaseStatus::DocumentsUploaded,
            });
        }

        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            case_id,
            document_type: doc.document_type.trim().to_lowercase(),
            original_filename: doc.original_filename,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            storage_key: doc.storage_key,
            status: DocumentStatus::Uploaded,
            extracted_text: None,
            extracted_fields: ExtractedFields::default(),
            failure_reason: None,
            uploaded_at: now,
        };

        let mut tx = self.pool().begin().await.map_err(storage_err)?;
        sqlx::query(
            "INSERT INTO documents (id, case_id, document_type, original_filename,
                                    content_type, size_bytes, storage_key, status,
                                    extracted_fields, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(document.case_id.to_string())
        .bind(&document.document_type)
        .bind(&document.original_filename)
        .bind(document.content_type.as_mime())
        .bind(document.size_bytes as i64)
        .bind(&document.storage_key)
        .bind(document.status.as_str())
        .bind(serde_json::to_string(&document.extracted_fields).map_err(storage_err)?)
        .bind(fmt_ts(document.uploaded_at))
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if case.status == CaseStatus::Draft {
            sqlx::query("UPDATE cases SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(CaseStatus::DocumentsUploaded.as_str())
                .bind(fmt_ts(now))
                .bind(case_id.to_string())
                .bind(CaseStatus::Draft.as_str())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        insert_audit(
            &mut tx,
            case_id,
            AuditAction::DocumentUploaded,
            Some(actor.id),
            None,
            serde_json::json!({
                "document_id": document.id,
                "document_type": document.document_type,
            }),
        )
        .await?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(
            case_id = %case_id,
            document_id = %document.id,
            document_type = %document.document_type,
            "document uploaded"
        );
        Ok(document)
    }

    pub async fn read_documents(&self, case_id: Uuid) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE case_id = ? ORDER BY uploaded_at ASC, id ASC",
        )
        .bind(case_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;
        rows.iter().map(document_from_row).collect()
    }

    pub async fn count_documents(&self, case_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE case_id = ?")
            .bind(case_id.to_string())
            .fetch_one(self.pool())
            .await
            .map_err(storage_err)?;
        Ok(count.max(0) as u64)
    }

    pub async fn set_document_status(&self, document_id: Uuid, status: DocumentStatus) -> Result<()> {
        let done = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(document_id.to_string())
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("document"));
        }
        Ok(())
    }

    /// Write a successful extraction back onto the document.
    pub async fn store_extraction(
        &self,
        document_id: Uuid,
        extracted_text: &str,
        extracted_fields: &ExtractedFields,
    ) -> Result<()> {
        let done = sqlx::query(
            "UPDATE documents SET status = ?, extracted_text = ?, extracted_fields = ?,
                                  failure_reason = NULL
             WHERE id = ?",
        )
        .bind(DocumentStatus::Processed.as_str())
        .bind(extracted_text)
        .bind(serde_json::to_string(extracted_fields).map_err(storage_err)?)
        .bind(document_id.to_string())
        .execute(self.pool())
        .await
        .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("document"));
        }
        Ok(())
    }

    /// Mark a document as failed with the extractor's reason.
    pub async fn store_extraction_failure(&self, document_id: Uuid, reason: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE documents SET status = ?, failure_reason = ? WHERE id = ?",
        )
        .bind(DocumentStatus::Failed.as_str())
        .bind(reason)
        .bind(document_id.to_string())
        .execute(self.pool())
        .await
        .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("document"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::NewCase;

    async fn store_case() -> (Store, Uuid, Actor) {
        let store = Store::in_memory().await.unwrap();
        let user = store
            .create_user("owner@example.com", "h", "O", false)
            .await
            .unwrap();
        let actor = Actor::user(user.id);
        let case = store
            .create_case(
                actor,
                NewCase {
                    applicant_full_name: "Ola Nordmann".into(),
                    applicant_nationality: "Norwegian".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        (store, case.id, actor)
    }

    fn new_doc(ty: &str) -> NewDocument {
        NewDocument {
            document_type: ty.into(),
            original_filename: format!("{ty}.pdf"),
            content_type: ContentType::Pdf,
            size_bytes: 1024,
            storage_key: format!("documents/x/{ty}"),
        }
    }

    #[tokio::test]
    async fn test_first_upload_transitions_draft() {
        let (store, case_id, actor) = store_case().await;
        store.add_document(case_id, new_doc("Passport"), actor).await.unwrap();

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::DocumentsUploaded);

        // Type label is normalized
        let docs = store.read_documents(case_id).await.unwrap();
        assert_eq!(docs[0].document_type, "passport");
        assert_eq!(docs[0].status, DocumentStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_second_upload_keeps_status() {
        let (store, case_id, actor) = store_case().await;
        store.add_document(case_id, new_doc("passport"), actor).await.unwrap();
        store.add_document(case_id, new_doc("residence_permit"), actor).await.unwrap();

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::DocumentsUploaded);
        assert_eq!(store.count_documents(case_id).await.unwrap(), 2);

        // Two uploads, two audit entries
        let trail = store.read_audit_trail(case_id).await.unwrap();
        let uploads = trail
            .iter()
            .filter(|e| e.action == AuditAction::DocumentUploaded)
            .count();
        assert_eq!(uploads, 2);
    }

    #[tokio::test]
    async fn test_same_bytes_twice_yields_two_documents() {
        let (store, case_id, actor) = store_case().await;
        let a = store.add_document(case_id, new_doc("passport"), actor).await.unwrap();
        let b = store.add_document(case_id, new_doc("passport"), actor).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count_documents(case_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stranger_cannot_upload() {
        let (store, case_id, _) = store_case().await;
        let stranger = store
            .create_user("s@example.com", "h", "S", false)
            .await
            .unwrap();
        let err = store
            .add_document(case_id, new_doc("passport"), Actor::user(stranger.id))
            .await;
        assert!(matches!(err, Err(Error::NotFound("case"))));
    }

    #[tokio::test]
    async fn test_document_type_length_validated() {
        let (store, case_id, actor) = store_case().await;
        let err = store
            .add_document(case_id, new_doc(&"x".repeat(200)), actor)
            .await;
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_extraction_round_trip() {
        let (store, case_id, actor) = store_case().await;
        let doc = store.add_document(case_id, new_doc("passport"), actor).await.unwrap();

        let mut fields = ExtractedFields::default();
        fields.identifiers.passport.insert("NO1234567".into());
        fields.finalize_richness();

        store
            .store_extraction(doc.id, "Passport NO1234567", &fields)
            .await
            .unwrap();

        let docs = store.read_documents(case_id).await.unwrap();
        assert_eq!(docs[0].status, DocumentStatus::Processed);
        assert_eq!(docs[0].extracted_text.as_deref(), Some("Passport NO1234567"));
        assert!(docs[0].extracted_fields.identifiers.passport.contains("NO1234567"));
    }

    #[tokio::test]
    async fn test_extraction_failure_records_reason() {
        let (store, case_id, actor) = store_case().await;
        let doc = store.add_document(case_id, new_doc("passport"), actor).await.unwrap();
        store
            .store_extraction_failure(doc.id, "document is empty")
            .await
            .unwrap();

        let docs = store.read_documents(case_id).await.unwrap();
        assert_eq!(docs[0].status, DocumentStatus::Failed);
        assert_eq!(docs[0].failure_reason.as_deref(), Some("document is empty"));
    }
}
