pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod resource;
pub mod schedule;
pub mod session;
pub mod view;

pub use config::ClientConfig;
pub use error::GardenClientError;
pub use http_client::HttpClient;
pub use resource::{
    CareSchedules, Comments, ForumPosts, Layouts, Plants, Resource, ResourceApi, Saved, Tips,
};
pub use schedule::{DueNotice, DueNotifier, RepeatPolicy};
pub use session::{FileStorage, MemoryStorage, SessionHolder, SessionStorage};
pub use view::{Form, Notice, NoticeLevel, Phase, ResourceView};

use models::{
    Comment, CommentDraft, LoginRequest, LoginResponse, ReactionKind, Reactions,
    RegisterRequest, RegisterResponse,
};
use std::sync::Arc;

/// Entry point tying one session to one API origin.
#[derive(Debug, Clone)]
pub struct GardenClient {
    http: Arc<HttpClient>,
}

impl GardenClient {
    pub fn new(config: ClientConfig, session: SessionHolder) -> Result<Self, GardenClientError> {
        Ok(Self {
            http: Arc::new(HttpClient::new(config, session)?),
        })
    }

    /// Client with an in-memory session, handy for scripts and tests.
    pub fn connect(base_url: impl Into<String>) -> Result<Self, GardenClientError> {
        Self::new(ClientConfig::new(base_url), SessionHolder::in_memory())
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn session(&self) -> &SessionHolder {
        self.http.session()
    }

    pub fn base_url(&self) -> &str {
        &self.http.config().base_url
    }

    /// Register a new user. Signs in right away when the server returns a token.
    pub async fn register(
        &self,
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<RegisterResponse, GardenClientError> {
        let req = RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        };
        tracing::debug!("Register called for username: {}", req.username);
        self.http.register(req).await
    }

    /// Login with email and password; the session holds the new token on success.
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<LoginResponse, GardenClientError> {
        let req = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        tracing::debug!("Login called for email: {}", req.email);
        self.http.login(req).await
    }

    pub async fn logout(&self) -> Result<(), GardenClientError> {
        self.http.logout().await
    }

    pub async fn refresh(&self) -> Result<String, GardenClientError> {
        self.http.refresh().await
    }

    pub fn is_signed_in(&self) -> bool {
        self.session().has_session()
    }

    /// A fresh, unmounted view over `resource` backed by this client.
    pub fn view<R: Resource>(&self, resource: R) -> ResourceView<R> {
        let api: Arc<dyn ResourceApi<R>> = self.http.clone();
        ResourceView::new(resource, api)
    }

    pub async fn react(
        &self,
        post_id: i64,
        kind: ReactionKind,
    ) -> Result<Reactions, GardenClientError> {
        self.http.react(post_id, kind).await
    }

    pub async fn reply(
        &self,
        post_id: i64,
        comment_id: i64,
        content: impl Into<String>,
    ) -> Result<Comment, GardenClientError> {
        self.http
            .reply(post_id, comment_id, &CommentDraft::new(content))
            .await
    }

    pub fn due_notifier(&self) -> DueNotifier {
        DueNotifier::new(self.http.config().due_check_period)
    }
}
