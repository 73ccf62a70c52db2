//! reqwest implementation of [`RemoteGateway`]

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AuthResponse, GatewayResult, RegisterRequest, RemoteGateway};
use crate::auth::Session;
use crate::config::ClientConfig;
use crate::error::{Error, NetworkError, Result};
use crate::models::{
    Course, CourseDetail, CourseSearchParams, CourseSuggestion, EntityId, StatsOverview,
    StatsTimelinePoint, SuggestionDraft, TimelineGrouping, UserProfile, Visit, VisitDraft,
    VisitFilter, WishlistEntry,
};
use crate::util::{compact_text, is_http_url, normalize_base_url};

/// HTTP client for the remote service
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Client,
    session: Session,
}

impl HttpGateway {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration, session: Session) -> Result<Self> {
        let base_url = normalize_base_url(base_url.as_ref());
        if !is_http_url(&base_url) {
            return Err(Error::Config(format!(
                "API URL must include http:// or https:// (got '{base_url}')"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            client,
            session,
        })
    }

    pub fn from_config(config: &ClientConfig, session: Session) -> Result<Self> {
        Self::new(&config.api_url, config.request_timeout(), session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("Accept", "application/json");
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> GatewayResult<String> {
        let response = request.send().await.map_err(NetworkError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(NetworkError::from)?;

        if !status.is_success() {
            tracing::debug!("API response error ({status}): {}", compact_text(&body));
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body: parse_api_error(status, &body),
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> GatewayResult<T> {
        let body = Self::send(request).await?;
        serde_json::from_str(&body).map_err(|error| {
            tracing::warn!("Failed to decode response: {error}");
            NetworkError::Decode(format!("{error}: {}", compact_text(&body)))
        })
    }

    async fn send_empty(request: RequestBuilder) -> GatewayResult<()> {
        Self::send(request).await.map(|_| ())
    }

    fn since_query(request: RequestBuilder, since: Option<DateTime<Utc>>) -> RequestBuilder {
        match since {
            Some(since) => request.query(&[("since", crate::db::store::format_timestamp(&since))]),
            None => request,
        }
    }
}

/// A create/update acknowledgement is useless without a version.
fn require_version(visit: Visit) -> GatewayResult<Visit> {
    if visit.server_updated_at.is_none() {
        return Err(NetworkError::Decode(format!(
            "response for visit {} is missing serverUpdatedAt",
            visit.id
        )));
    }
    Ok(visit)
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_courses(&self, params: &CourseSearchParams) -> GatewayResult<Vec<Course>> {
        Self::send_json(self.request(Method::GET, "/api/courses").query(params)).await
    }

    async fn get_course(&self, id: &EntityId) -> GatewayResult<CourseDetail> {
        let path = format!("/api/courses/{}", segment(id.as_str()));
        Self::send_json(self.request(Method::GET, &path)).await
    }

    async fn course_delta(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<CourseDetail>> {
        let request = Self::since_query(self.request(Method::GET, "/api/courses/delta"), since);
        Self::send_json(request).await
    }

    async fn list_visits(&self, filter: &VisitFilter) -> GatewayResult<Vec<Visit>> {
        Self::send_json(self.request(Method::GET, "/api/me/visits").query(filter)).await
    }

    async fn create_visit(&self, draft: &VisitDraft) -> GatewayResult<Visit> {
        let visit = Self::send_json(self.request(Method::POST, "/api/visits").json(draft)).await?;
        require_version(visit)
    }

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> GatewayResult<Visit> {
        let path = format!("/api/me/visits/{}", segment(id.as_str()));
        let visit = Self::send_json(self.request(Method::PATCH, &path).json(draft)).await?;
        require_version(visit)
    }

    async fn delete_visit(&self, id: &EntityId) -> GatewayResult<()> {
        let path = format!("/api/me/visits/{}", segment(id.as_str()));
        Self::send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn visited_courses(&self) -> GatewayResult<Vec<Visit>> {
        Self::send_json(self.request(Method::GET, "/api/me/visited-courses")).await
    }

    async fn list_wishlist(&self) -> GatewayResult<Vec<WishlistEntry>> {
        Self::send_json(self.request(Method::GET, "/api/me/wishlist")).await
    }

    async fn add_to_wishlist(&self, course_id: &EntityId) -> GatewayResult<WishlistEntry> {
        let payload = serde_json::json!({ "courseId": course_id });
        Self::send_json(self.request(Method::POST, "/api/wishlist").json(&payload)).await
    }

    async fn remove_from_wishlist(&self, course_id: &EntityId) -> GatewayResult<()> {
        let path = format!("/api/wishlist/{}", segment(course_id.as_str()));
        Self::send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn stats_overview(&self) -> GatewayResult<StatsOverview> {
        Self::send_json(self.request(Method::GET, "/api/me/stats/overview")).await
    }

    async fn stats_timeline(
        &self,
        group_by: TimelineGrouping,
    ) -> GatewayResult<Vec<StatsTimelinePoint>> {
        let request = self
            .request(Method::GET, "/api/me/stats/timeline")
            .query(&[("groupBy", group_by.as_str())]);
        Self::send_json(request).await
    }

    async fn public_stats(&self, slug: &str) -> GatewayResult<StatsOverview> {
        let path = format!("/api/profile/{}/stats/overview", segment(slug));
        Self::send_json(self.request(Method::GET, &path)).await
    }

    async fn public_visited_courses(&self, slug: &str) -> GatewayResult<Vec<Visit>> {
        let path = format!("/api/profile/{}/visited-courses", segment(slug));
        Self::send_json(self.request(Method::GET, &path)).await
    }

    async fn submit_suggestion(&self, draft: &SuggestionDraft) -> GatewayResult<CourseSuggestion> {
        Self::send_json(
            self.request(Method::POST, "/api/course-suggestions")
                .json(draft),
        )
        .await
    }

    async fn suggestion_delta(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<CourseSuggestion>> {
        let request = Self::since_query(
            self.request(Method::GET, "/api/course-suggestions/delta"),
            since,
        );
        Self::send_json(request).await
    }

    async fn login(&self, email: &str, password: &str) -> GatewayResult<AuthResponse> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        Self::send_json(self.request(Method::POST, "/api/auth/login").json(&payload)).await
    }

    async fn register(&self, request: &RegisterRequest) -> GatewayResult<AuthResponse> {
        Self::send_json(self.request(Method::POST, "/api/user").json(request)).await
    }

    async fn current_user(&self) -> GatewayResult<UserProfile> {
        Self::send_json(self.request(Method::GET, "/api/auth/me")).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: Option<String>,
    error: Option<String>,
    title: Option<String>,
    detail: Option<String>,
}

/// Human-readable message for a failed response.
pub fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.detail)
            .or(payload.title)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
