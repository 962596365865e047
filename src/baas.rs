// 🗄️ BaaS Client - Generic table endpoints and admin-user endpoints
//
// Tables follow PostgREST conventions: `/rest/v1/{table}?col=eq.value`.
// Admin calls authenticate with the service key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BaasConfig;
use crate::error::{check_status, RemoteError};

const SERVICE: &str = "baas";

/// Page size when scanning admin users
const USERS_PER_PAGE: usize = 200;

/// Upper bound on pages scanned by `find_user_by_email`
const MAX_USER_PAGES: usize = 50;

/// `column=eq.value` filter
pub fn eq(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{}", value))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAuthUser {
    pub email: String,
    pub password: String,
    pub email_confirm: bool,
    pub user_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateUserOutcome {
    Created(AuthUser),
    AlreadyExists,
}

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<AuthUser>,
}

#[derive(Debug, Clone)]
pub struct BaasClient {
    http: reqwest::Client,
    url: String,
    service_key: String,
}

impl BaasClient {
    pub fn new(config: &BaasConfig) -> Self {
        BaasClient {
            http: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_path(table: &str) -> String {
        format!("/rest/v1/{}", table)
    }

    // ========================================================================
    // TABLE ENDPOINTS
    // ========================================================================

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, &Self::table_path(table))
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<Vec<T>, RemoteError> {
        let response = self
            .request(reqwest::Method::POST, &Self::table_path(table))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    /// Update matching rows and return them (empty when nothing matched)
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(String, String)],
        body: &B,
    ) -> Result<Vec<T>, RemoteError> {
        let response = self
            .request(reqwest::Method::PATCH, &Self::table_path(table))
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    pub async fn delete(&self, table: &str, filters: &[(String, String)]) -> Result<(), RemoteError> {
        if filters.is_empty() {
            // PostgREST would delete the whole table
            return Err(RemoteError::Decode {
                service: SERVICE,
                message: format!("refusing unfiltered delete on {}", table),
            });
        }

        let response = self
            .request(reqwest::Method::DELETE, &Self::table_path(table))
            .query(filters)
            .send()
            .await?;

        check_status(SERVICE, response).await?;
        Ok(())
    }

    // ========================================================================
    // ADMIN USERS
    // ========================================================================

    pub async fn create_user(&self, user: &NewAuthUser) -> Result<CreateUserOutcome, RemoteError> {
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/admin/users")
            .json(user)
            .send()
            .await?;

        match check_status(SERVICE, response).await {
            Ok(response) => {
                let created: AuthUser = response.json().await?;
                info!(user_id = %created.id, "auth user created");
                Ok(CreateUserOutcome::Created(created))
            }
            Err(err) if is_already_registered(&err) => {
                debug!(email = %user.email, "auth user already registered");
                Ok(CreateUserOutcome::AlreadyExists)
            }
            Err(err) => Err(err),
        }
    }

    /// Scan admin user pages for an email (case-insensitive)
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, RemoteError> {
        let wanted = email.trim().to_lowercase();

        for page in 1..=MAX_USER_PAGES {
            let response = self
                .request(reqwest::Method::GET, "/auth/v1/admin/users")
                .query(&[("page", page.to_string()), ("per_page", USERS_PER_PAGE.to_string())])
                .send()
                .await?;

            let batch: UserPage = check_status(SERVICE, response).await?.json().await?;
            let count = batch.users.len();

            if let Some(user) = batch
                .users
                .into_iter()
                .find(|u| u.email.as_deref().map(str::to_lowercase).as_deref() == Some(wanted.as_str()))
            {
                return Ok(Some(user));
            }

            if count < USERS_PER_PAGE {
                break;
            }
        }

        Ok(None)
    }
}

fn is_already_registered(err: &RemoteError) -> bool {
    match err {
        RemoteError::Status { status: 409, .. } => true,
        RemoteError::Status { status: 422, body, .. } => {
            let body = body.to_lowercase();
            body.contains("already") || body.contains("email_exists")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BaasClient {
        BaasClient::new(&BaasConfig {
            url: server.uri(),
            service_key: "service-key".to_string(),
        })
    }

    fn new_user() -> NewAuthUser {
        NewAuthUser {
            email: "ana@example.com".to_string(),
            password: "temporary".to_string(),
            email_confirm: true,
            user_metadata: json!({ "name": "Ana" }),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Row {
        id: String,
    }

    #[tokio::test]
    async fn test_select_sends_filters_and_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.user-1"))
            .and(query_param("select", "*"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "user-1" }])))
            .mount(&server)
            .await;

        let rows: Vec<Row> = client_for(&server)
            .select("profiles", &[eq("id", "user-1")])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "user-1");
    }

    #[tokio::test]
    async fn test_update_returns_matched_rows() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({ "subscription_status": "active" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let rows: Vec<Row> = client_for(&server)
            .update("profiles", &[eq("id", "nobody")], &json!({ "subscription_status": "active" }))
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unfiltered_delete_is_refused() {
        let server = MockServer::start().await;
        let err = client_for(&server).delete("transactions", &[]).await.unwrap_err();
        assert!(err.to_string().contains("unfiltered delete"));
    }

    #[tokio::test]
    async fn test_create_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(body_partial_json(json!({ "email": "ana@example.com", "email_confirm": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "email": "ana@example.com"
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).create_user(&new_user()).await.unwrap();
        match outcome {
            CreateUserOutcome::Created(user) => assert_eq!(user.id, "user-1"),
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_user_already_registered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "error_code": "email_exists",
                "msg": "A user with this email address has already been registered"
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).create_user(&new_user()).await.unwrap();
        assert_eq!(outcome, CreateUserOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_user_other_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_string("password too short"))
            .mount(&server)
            .await;

        let err = client_for(&server).create_user(&new_user()).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn test_find_user_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    { "id": "user-9", "email": "bruno@example.com" },
                    { "id": "user-1", "email": "Ana@Example.com" }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let found = client.find_user_by_email("ana@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("user-1".to_string()));

        let missing = client.find_user_by_email("carla@example.com").await.unwrap();
        assert!(missing.is_none());
    }

    fn full_page(offset: usize) -> serde_json::Value {
        let users: Vec<_> = (0..USERS_PER_PAGE)
            .map(|i| json!({ "id": format!("user-{}", offset + i), "email": format!("u{}@example.com", offset + i) }))
            .collect();
        json!({ "users": users })
    }

    #[tokio::test]
    async fn test_find_user_by_email_reads_next_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page(0)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "id": "user-late", "email": "ana@example.com" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let found = client_for(&server).find_user_by_email("ana@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("user-late".to_string()));
    }

    #[tokio::test]
    async fn test_find_user_by_email_stops_on_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "id": "user-1", "email": "bruno@example.com" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "users": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let found = client_for(&server).find_user_by_email("ana@example.com").await.unwrap();
        assert!(found.is_none());
    }
}
