use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::{
    CalendarQuery, ChangePasswordRequest, CheckResponse, CompletionRequest, CreateRoutineRequest,
    ErrorResponse, LoginRequest, LoginResponse, MessageResponse, SignupRequest, SignupResponse,
    UpdateRoutineRequest,
};
use routinest_core::gateway::RoutineGateway;
use routinest_core::models::{
    CalendarEntry, CalendarRoutine, CalendarWindow, CreationDate, DAY_FORMAT, LocalRoutine,
    NewRoutine, RoutineSummary,
};

/// Client for the routinest HTTP API.
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "routinest-cli/{} (routine tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            bail!("Not logged in. Run `routinest login` first");
        }
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorResponse>()
            .await
            .map_or_else(|_| status.to_string(), |e| e.error);
        bail!("{message} ({})", status.as_u16())
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .context("Failed to parse server response")
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    // --- Account ---

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        local_routines: Vec<LocalRoutine>,
    ) -> Result<SignupResponse> {
        let body = SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            local_routines,
        };
        self.post_json("/api/auth/signup", &body).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/api/auth/login", &body).await
    }

    pub async fn logout(&self) -> Result<MessageResponse> {
        self.require_token()?;
        self.send_json(self.request(Method::POST, "/api/auth/logout"))
            .await
    }

    pub async fn check(&self) -> Result<CheckResponse> {
        self.require_token()?;
        self.send_json(self.request(Method::GET, "/api/auth/check"))
            .await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<MessageResponse> {
        self.require_token()?;
        let body = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.post_json("/api/auth/change-password", &body).await
    }

    // --- Routines ---

    pub async fn update_routine(
        &self,
        id: &str,
        title: &str,
        url: Option<String>,
    ) -> Result<RoutineSummary> {
        self.require_token()?;
        let body = UpdateRoutineRequest {
            title: title.to_string(),
            url,
        };
        self.send_json(
            self.request(Method::PUT, &format!("/api/routines/{id}"))
                .json(&body),
        )
        .await
    }

    pub async fn set_completed(&self, id: &str, completed: bool) -> Result<RoutineSummary> {
        self.require_token()?;
        self.send_json(
            self.request(Method::PATCH, &format!("/api/routines/{id}"))
                .json(&CompletionRequest { completed }),
        )
        .await
    }

    pub async fn delete_routine(&self, id: &str) -> Result<()> {
        self.require_token()?;
        self.send(self.request(Method::DELETE, &format!("/api/routines/{id}")))
            .await?;
        Ok(())
    }

    pub async fn calendar_events(&self, window: CalendarWindow) -> Result<Vec<CalendarEntry>> {
        self.require_token()?;
        self.send_json(
            self.request(Method::GET, "/api/routines/calendar/events")
                .query(&window_query(window)),
        )
        .await
    }
}

fn window_query(window: CalendarWindow) -> CalendarQuery {
    CalendarQuery {
        start: window.start.format(DAY_FORMAT).to_string(),
        end: window.end.format(DAY_FORMAT).to_string(),
    }
}

#[async_trait]
impl RoutineGateway for RemoteClient {
    async fn list_routines(&self) -> Result<Vec<RoutineSummary>> {
        self.require_token()?;
        self.send_json(self.request(Method::GET, "/api/routines"))
            .await
    }

    async fn list_calendar_routines(&self, window: CalendarWindow) -> Result<Vec<CalendarRoutine>> {
        self.require_token()?;
        self.send_json(
            self.request(Method::GET, "/api/routines/calendar")
                .query(&window_query(window)),
        )
        .await
    }

    async fn list_routine_creation_dates(&self) -> Result<Vec<CreationDate>> {
        let routines = self.list_routines().await?;
        Ok(routines
            .into_iter()
            .map(|r| CreationDate {
                id: r.id,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn create_routine(&self, routine: &NewRoutine) -> Result<RoutineSummary> {
        self.require_token()?;
        let body = CreateRoutineRequest {
            title: routine.title.clone(),
            url: routine.url.clone(),
            completed: routine.completed,
        };
        self.post_json("/api/routines", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = RemoteClient::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_window_query_uses_plain_days() {
        let window = CalendarWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let query = window_query(window);
        assert_eq!(query.start, "2024-01-01");
        assert_eq!(query.end, "2024-01-31");
    }

    async fn spawn_server() -> String {
        let app = crate::server::router(routinest_core::db::Database::open_in_memory().unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_login_sync_and_calendar_against_live_server() {
        use routinest_core::calendar::load_calendar;
        use routinest_core::local_store::{LocalRoutineStore, MemoryStore};
        use routinest_core::reconcile::Reconciler;
        use routinest_core::service::today_utc;

        let base = spawn_server().await;
        let anonymous = RemoteClient::new(&base, None).unwrap();
        anonymous
            .signup("ann@example.com", "password123", "Ann", Vec::new())
            .await
            .unwrap();
        let login = anonymous
            .login("ann@example.com", "password123")
            .await
            .unwrap();

        let client = RemoteClient::new(&base, Some(login.token)).unwrap();
        client
            .create_routine(&NewRoutine {
                title: "Water plants".to_string(),
                url: None,
                completed: false,
            })
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let local = vec![
            LocalRoutine::new("water plants", now),
            LocalRoutine {
                completed: true,
                ..LocalRoutine::new("Stretch", now + chrono::Duration::milliseconds(1))
            },
        ];
        let reconciler = Reconciler::new(
            Box::new(client.clone()),
            LocalRoutineStore::new(Box::new(MemoryStore::with_routines(&local).unwrap())),
        );
        let report = reconciler.reconcile(None).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.matched, 1);

        let routines = client.list_routines().await.unwrap();
        assert_eq!(routines.len(), 2);

        let today = today_utc();
        let window = CalendarWindow::new(today - chrono::Duration::days(6), today);
        let entries = load_calendar(&client, window, today).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.title == "Stretch ✓"));
        assert_eq!(client.calendar_events(window).await.unwrap(), entries);

        let check = client.check().await.unwrap();
        assert_eq!(check.email, "ann@example.com");
        client.logout().await.unwrap();
        assert!(client.check().await.is_err());
    }

    #[tokio::test]
    async fn test_server_errors_surface_message() {
        let base = spawn_server().await;
        let client = RemoteClient::new(&base, None).unwrap();
        let err = client
            .login("nobody@example.com", "password123")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials (401)");
    }

    #[tokio::test]
    async fn test_requires_login_before_network() {
        let client = RemoteClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.list_routines().await.unwrap_err();
        assert!(err.to_string().contains("Not logged in"));
    }
}
