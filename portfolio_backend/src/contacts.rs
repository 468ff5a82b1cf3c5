use crate::error::{cancellable, ServiceError, ValidationError};
use crate::sanitize::{plain_text, sanitize_html};
use crate::store::{Contact, NewContact, RecordStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactInput {
    /// Name and email lose all markup. The message gets the comment
    /// allow-list since it ends up in the same HTML-rendering tools.
    pub fn sanitized(&self) -> Self {
        Self {
            name: plain_text(self.name.trim()),
            email: plain_text(self.email.trim()),
            message: sanitize_html(self.message.trim()),
        }
    }

    /// The presence checks the contact form performs before submitting.
    pub fn require_fields(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("message", &self.message),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::FieldRequired(field));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn RecordStore>,
}

impl ContactService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Stores the message as given; only the table's own constraints apply.
    pub async fn save_contact(
        &self,
        input: ContactInput,
        cancel: &CancellationToken,
    ) -> Result<Contact, ServiceError> {
        let record = NewContact {
            name: input.name,
            email: input.email,
            message: input.message,
        };
        let contact = cancellable(cancel, self.store.insert_contact(&record))
            .await
            .inspect_err(|err| tracing::error!(error = %err, "failed to save contact message"))?;
        tracing::info!(contact_id = ?contact.id, "contact message saved");
        Ok(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn input(name: &str, email: &str, message: &str) -> ContactInput {
        ContactInput {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }

    #[test]
    fn sanitizes_every_field() {
        let cleaned = input(
            "<script>x</script>Ada",
            " ada@example.com ",
            r#"<a href="javascript:void(0)" onclick="x()">hi</a>"#,
        )
        .sanitized();
        assert_eq!(cleaned.name, "Ada");
        assert_eq!(cleaned.email, "ada@example.com");
        assert_eq!(cleaned.message, "<a>hi</a>");

        let cleaned = input("<b>Ada</b> & co", "<i>a@b.c</i>", "<b>hi</b>").sanitized();
        assert_eq!(cleaned.name, "Ada & co");
        assert_eq!(cleaned.email, "a@b.c");
        assert_eq!(cleaned.message, "<b>hi</b>");
    }

    #[test]
    fn required_fields_are_reported_by_name() {
        assert_eq!(
            input("Ada", " ", "hi").require_fields(),
            Err(ValidationError::FieldRequired("email"))
        );
        assert!(input("Ada", "a@b.c", "hi").require_fields().is_ok());
    }

    #[tokio::test]
    async fn saves_without_further_checks() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let service = ContactService::new(Arc::new(store));
        let long_message = "m".repeat(5000);
        let contact = service
            .save_contact(input("Ada", "ada@example.com", &long_message), &CancellationToken::new())
            .await
            .unwrap();
        assert!(contact.id.is_some());
        assert_eq!(contact.message.len(), 5000);
    }

    #[tokio::test]
    async fn missing_table_is_an_error_for_contacts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let service = ContactService::new(Arc::new(store));
        let err = service
            .save_contact(input("Ada", "a@b.c", "hi"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(ref e) if e.is_missing_relation()));
    }
}
