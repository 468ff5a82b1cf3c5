use super::models::{Comment, Contact, NewComment, NewContact};
use super::{RecordStore, StoreError, COMMENTS_TABLE, CONTACTS_TABLE};
use crate::config::HostedStorageConfig;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Error codes the hosted service uses for a table that does not exist:
/// the Postgres code and the REST layer's schema-cache miss.
const MISSING_RELATION_CODES: &[&str] = &["42P01", "PGRST205"];

/// DDL for provisioning the hosted tables. The REST interface cannot run
/// DDL, so this is printed for an operator to paste into the SQL editor.
pub const HOSTED_SCHEMA_SQL: &str = r#"CREATE TABLE IF NOT EXISTS public.comments (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  name TEXT NOT NULL CHECK (char_length(trim(name)) > 0 AND char_length(name) <= 100),
  message TEXT NOT NULL CHECK (char_length(trim(message)) > 0 AND char_length(message) <= 1000),
  created_at TIMESTAMPTZ DEFAULT NOW() NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_created_at_desc ON public.comments(created_at DESC);

ALTER TABLE public.comments ENABLE ROW LEVEL SECURITY;

DROP POLICY IF EXISTS "Public read access to comments" ON public.comments;
CREATE POLICY "Public read access to comments"
  ON public.comments FOR SELECT USING (true);

DROP POLICY IF EXISTS "Public insert access to comments" ON public.comments;
CREATE POLICY "Public insert access to comments"
  ON public.comments FOR INSERT WITH CHECK (true);

CREATE TABLE IF NOT EXISTS public.contacts (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  name TEXT NOT NULL,
  email TEXT NOT NULL,
  message TEXT NOT NULL,
  created_at TIMESTAMPTZ DEFAULT NOW() NOT NULL
);

ALTER TABLE public.contacts ENABLE ROW LEVEL SECURITY;

DROP POLICY IF EXISTS "Public insert access to contacts" ON public.contacts;
CREATE POLICY "Public insert access to contacts"
  ON public.contacts FOR INSERT WITH CHECK (true);

-- Updates and deletes are authorized by the portfolio server (ownership
-- tokens). Give the server a key that bypasses RLS instead of adding public
-- UPDATE/DELETE policies.
"#;

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Store backed by a hosted database's REST interface (PostgREST dialect).
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(config: &HostedStorageConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("portfolio_backend/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self::with_client(&config.url, &config.api_key, client))
    }

    pub fn with_client(base_url: &str, api_key: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn table_url(&self, table: &str, params: &[(&str, String)]) -> Result<Url, StoreError> {
        let raw = format!("{}/rest/v1/{}", self.base_url, table);
        let parsed = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        parsed.map_err(|err| StoreError::InvalidUrl(err.to_string()))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn id_filter(id: &str) -> Vec<(&'static str, String)> {
        vec![("id", format!("eq.{id}"))]
    }

    async fn rows<T: DeserializeOwned>(table: &str, response: Response) -> Result<Vec<T>, StoreError> {
        let response = check_status(table, response).await?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Decode(err.to_string()))
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, StoreError> {
        let url = self.table_url(COMMENTS_TABLE, &[])?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(comment)
            .send()
            .await?;
        Self::rows::<Comment>(COMMENTS_TABLE, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, StoreError> {
        let url = self.table_url(
            COMMENTS_TABLE,
            &[("select", "*".into()), ("order", "created_at.desc".into())],
        )?;
        let response = self.request(Method::GET, url).send().await?;
        Self::rows(COMMENTS_TABLE, response).await
    }

    async fn update_comment(
        &self,
        id: &str,
        changes: &NewComment,
    ) -> Result<Option<Comment>, StoreError> {
        let url = self.table_url(COMMENTS_TABLE, &Self::id_filter(id))?;
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;
        Ok(Self::rows::<Comment>(COMMENTS_TABLE, response)
            .await?
            .into_iter()
            .next())
    }

    async fn delete_comment(&self, id: &str) -> Result<bool, StoreError> {
        let url = self.table_url(COMMENTS_TABLE, &Self::id_filter(id))?;
        let response = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let deleted: Vec<serde_json::Value> = Self::rows(COMMENTS_TABLE, response).await?;
        Ok(!deleted.is_empty())
    }

    async fn insert_contact(&self, contact: &NewContact) -> Result<Contact, StoreError> {
        // No public SELECT policy on contacts, so the row cannot be read back.
        let url = self.table_url(CONTACTS_TABLE, &[])?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(contact)
            .send()
            .await?;
        check_status(CONTACTS_TABLE, response).await?;
        Ok(Contact {
            id: None,
            name: contact.name.clone(),
            email: contact.email.clone(),
            message: contact.message.clone(),
            created_at: None,
        })
    }

    async fn probe(&self) -> Result<(), StoreError> {
        for table in [COMMENTS_TABLE, CONTACTS_TABLE] {
            let url = self.table_url(table, &[("select", "id".into()), ("limit", "1".into())])?;
            let response = self.request(Method::GET, url).send().await?;
            check_status(table, response).await?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "hosted"
    }
}

async fn check_status(table: &str, response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(remote_error(table, status, &body))
}

fn remote_error(table: &str, status: StatusCode, body: &str) -> StoreError {
    let Ok(parsed) = serde_json::from_str::<RemoteErrorBody>(body) else {
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("storage request failed")
                .to_string()
        } else {
            body.trim().to_string()
        };
        return StoreError::Remote {
            status: status.as_u16(),
            code: None,
            message,
            details: None,
            hint: None,
        };
    };

    let code_matches = parsed
        .code
        .as_deref()
        .map(|code| MISSING_RELATION_CODES.contains(&code))
        .unwrap_or(false);
    let message_matches = parsed
        .message
        .as_deref()
        .map(|message| message.starts_with("relation ") && message.contains("does not exist"))
        .unwrap_or(false);
    if code_matches || message_matches {
        return StoreError::MissingRelation(table.to_string());
    }

    tracing::debug!(
        table,
        status = status.as_u16(),
        code = ?parsed.code,
        details = ?parsed.details,
        hint = ?parsed.hint,
        "storage request rejected"
    );
    StoreError::Remote {
        status: status.as_u16(),
        message: parsed
            .message
            .unwrap_or_else(|| format!("storage request failed with status {status}")),
        code: parsed.code,
        details: parsed.details,
        hint: parsed.hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_relation_codes_are_recognised() {
        let err = remote_error(
            "comments",
            StatusCode::NOT_FOUND,
            r#"{"code":"PGRST205","message":"Could not find the table 'public.comments' in the schema cache","details":null,"hint":null}"#,
        );
        assert!(matches!(err, StoreError::MissingRelation(ref table) if table == "comments"));

        let err = remote_error(
            "comments",
            StatusCode::BAD_REQUEST,
            r#"{"code":"42P01","message":"relation \"public.comments\" does not exist"}"#,
        );
        assert!(err.is_missing_relation());

        let err = remote_error(
            "comments",
            StatusCode::BAD_REQUEST,
            r#"{"message":"relation \"public.comments\" does not exist"}"#,
        );
        assert!(err.is_missing_relation());
    }

    #[test]
    fn missing_columns_are_not_missing_tables() {
        let err = remote_error(
            "comments",
            StatusCode::BAD_REQUEST,
            r#"{"code":"42703","message":"column comments.foo does not exist"}"#,
        );
        match err {
            StoreError::Remote { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("42703"));
                assert_eq!(message, "column comments.foo does not exist");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn other_remote_errors_keep_their_message() {
        let err = remote_error(
            "comments",
            StatusCode::BAD_REQUEST,
            r#"{"code":"23514","message":"new row violates check constraint","details":"Failing row","hint":null}"#,
        );
        match err {
            StoreError::Remote {
                status,
                code,
                message,
                details,
                ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("23514"));
                assert_eq!(message, "new row violates check constraint");
                assert_eq!(details.as_deref(), Some("Failing row"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unparseable_bodies_fall_back_to_status_text() {
        let err = remote_error("contacts", StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Bad Gateway");
    }

    #[test]
    fn filters_are_url_encoded() {
        let store = RestStore::with_client("https://db.example.com/", "key", reqwest::Client::new());
        let url = store
            .table_url(COMMENTS_TABLE, &RestStore::id_filter("a b&c"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://db.example.com/rest/v1/comments?id=eq.a+b%26c"
        );
    }
}
