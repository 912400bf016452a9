use crate::config::ClientConfig;
use crate::error::GardenClientError;
use crate::models::{
    Comment, CommentDraft, LoginRequest, LoginResponse, ReactionKind, ReactionRequest,
    ReactionResponse, Reactions, RefreshResponse, RegisterRequest, RegisterResponse, Validate,
};
use crate::resource::{Comments, ForumPosts, Resource, ResourceApi, Saved};
use crate::session::SessionHolder;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

/// Which credentials a request carries.
#[derive(Debug, Clone)]
enum Auth {
    /// Whatever token the session holds at send time.
    Session,
    Anonymous,
    Bearer(String),
}

/// Stateless request/response translator. Every call reads the token from the
/// injected [`SessionHolder`] at send time.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
    session: SessionHolder,
}

impl HttpClient {
    pub fn new(config: ClientConfig, session: SessionHolder) -> Result<Self, GardenClientError> {
        config.validate()?;

        let mut builder = Client::builder()
            .cookie_store(true)
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn add_auth_header(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends one request and returns the raw body of a 2xx response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<String, GardenClientError> {
        let token = match auth {
            Auth::Session => self.session.token(),
            Auth::Anonymous => None,
            Auth::Bearer(token) => Some(token),
        };

        let url = self.config.url(path);
        let mut request = self
            .add_auth_header(self.client.request(method.clone(), &url), token.as_deref())
            .header(header::ACCEPT, "application/json");

        if let Some(body) = body {
            let payload = serde_json::to_vec(body)?;
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(payload);
        }

        tracing::debug!(
            "{} {} (authenticated: {})",
            method,
            path,
            token.is_some()
        );

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("{} {} failed before a response: {}", method, path, e);
                return Err(e.into());
            }
        };

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(text);
        }

        if status == StatusCode::UNAUTHORIZED && token.is_some() {
            tracing::warn!("{} {} rejected the token, clearing session", method, path);
            if let Err(e) = self.session.clear_session() {
                tracing::warn!("Failed to clear session: {}", e);
            }
        }

        let error = GardenClientError::from_response(status.as_u16(), &text);
        tracing::warn!("{} {} failed: {}", method, path, error);
        Err(error)
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<T, GardenClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let text = self.send(method, path, body, auth).await?;
        decode(path, &text)
    }

    // ==================== Авторизация ====================

    pub async fn register(
        &self,
        req: RegisterRequest,
    ) -> Result<RegisterResponse, GardenClientError> {
        req.validate()?;

        let response: RegisterResponse = self
            .request(Method::POST, "/register", Some(&req), Auth::Anonymous)
            .await?;

        if let Some(token) = &response.access_token {
            self.session.set_session(token.clone(), req.username.clone())?;
            self.session.set_refresh_token(response.refresh_token.clone())?;
        }

        tracing::info!("Registered user {}", req.username);
        Ok(response)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, GardenClientError> {
        req.validate()?;

        let response: LoginResponse = self
            .request(Method::POST, "/login", Some(&req), Auth::Anonymous)
            .await?;

        let username = response
            .username
            .clone()
            .unwrap_or_else(|| req.email.clone());
        self.session
            .set_session(response.access_token.clone(), username)?;
        self.session
            .set_refresh_token(response.refresh_token.clone())?;

        Ok(response)
    }

    /// Tells the server, then clears the local session whatever the server said.
    pub async fn logout(&self) -> Result<(), GardenClientError> {
        let result = self
            .send::<()>(Method::POST, "/logout", None, Auth::Session)
            .await;
        self.session.clear_session()?;
        result.map(|_| ())
    }

    /// Exchanges the refresh token (or the current access token) for a new access token.
    pub async fn refresh(&self) -> Result<String, GardenClientError> {
        let credential = self
            .session
            .refresh_token()
            .or_else(|| self.session.token())
            .ok_or_else(|| GardenClientError::Unauthorized("No session to refresh".into()))?;

        let response: RefreshResponse = self
            .request::<_, ()>(Method::POST, "/refresh", None, Auth::Bearer(credential))
            .await?;

        self.session
            .replace_access_token(response.access_token.clone())?;
        Ok(response.access_token)
    }

    // ==================== Ресурсы ====================

    pub async fn list<R: Resource>(&self, resource: &R) -> Result<Vec<R::Entity>, GardenClientError> {
        self.request::<_, ()>(Method::GET, &resource.collection_path(), None, Auth::Session)
            .await
    }

    pub async fn create<R: Resource>(
        &self,
        resource: &R,
        draft: &R::Draft,
    ) -> Result<Saved<R::Entity>, GardenClientError> {
        draft.validate()?;
        let path = resource.collection_path();
        let text = self
            .send(Method::POST, &path, Some(draft), Auth::Session)
            .await?;
        let saved = decode_saved::<R>(&path, &text)?;
        match &saved {
            Saved::Entity(entity) => {
                tracing::info!("Created {} #{}", resource.label(), R::entity_id(entity))
            }
            Saved::Acknowledged { .. } => tracing::info!("Created {}", resource.label()),
        }
        Ok(saved)
    }

    pub async fn update<R: Resource>(
        &self,
        resource: &R,
        id: i64,
        patch: &R::Patch,
    ) -> Result<Saved<R::Entity>, GardenClientError> {
        patch.validate()?;
        let path = resource.item_path(id);
        let text = self
            .send(Method::PATCH, &path, Some(patch), Auth::Session)
            .await?;
        let saved = decode_saved::<R>(&path, &text)?;
        tracing::info!("Updated {} #{}", resource.label(), id);
        Ok(saved)
    }

    pub async fn delete<R: Resource>(&self, resource: &R, id: i64) -> Result<(), GardenClientError> {
        self.send::<()>(Method::DELETE, &resource.item_path(id), None, Auth::Session)
            .await?;
        tracing::info!("Deleted {} #{}", resource.label(), id);
        Ok(())
    }

    // ==================== Форум ====================

    pub async fn react(
        &self,
        post_id: i64,
        kind: ReactionKind,
    ) -> Result<Reactions, GardenClientError> {
        let response: ReactionResponse = self
            .request(
                Method::POST,
                &ForumPosts::reactions_path(post_id),
                Some(&ReactionRequest { kind }),
                Auth::Session,
            )
            .await?;
        Ok(response.reactions)
    }

    pub async fn reply(
        &self,
        post_id: i64,
        comment_id: i64,
        draft: &CommentDraft,
    ) -> Result<Comment, GardenClientError> {
        draft.validate()?;
        self.request(
            Method::POST,
            &Comments::on_post(post_id).replies_path(comment_id),
            Some(draft),
            Auth::Session,
        )
        .await
    }
}

fn decode<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, GardenClientError> {
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!("Unexpected payload from {}: {}", path, e);
        GardenClientError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        }
    })
}

/// A save answers with the entity, the entity inside the resource's envelope, or
/// only a confirmation message. Anything else is a `Decode` error.
fn decode_saved<R: Resource>(
    path: &str,
    text: &str,
) -> Result<Saved<R::Entity>, GardenClientError> {
    if text.trim().is_empty() {
        return Ok(Saved::Acknowledged { message: None });
    }

    let value: serde_json::Value = decode(path, text)?;
    let entity_error = match serde_json::from_value::<R::Entity>(value.clone()) {
        Ok(entity) => return Ok(Saved::Entity(entity)),
        Err(e) => e,
    };

    if let Some(inner) = R::envelope().and_then(|key| value.get(key)) {
        return decode(path, &inner.to_string()).map(Saved::Entity);
    }

    let message = ["msg", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|m| m.as_str()));
    match (value.as_object(), message) {
        (Some(_), Some(message)) => Ok(Saved::Acknowledged {
            message: Some(message.to_string()),
        }),
        (Some(fields), None) if fields.is_empty() => Ok(Saved::Acknowledged { message: None }),
        _ => {
            tracing::warn!("Unexpected payload from {}: {}", path, entity_error);
            Err(GardenClientError::Decode {
                path: path.to_string(),
                message: entity_error.to_string(),
            })
        }
    }
}

#[async_trait]
impl<R: Resource> ResourceApi<R> for HttpClient {
    async fn list(&self, resource: &R) -> Result<Vec<R::Entity>, GardenClientError> {
        HttpClient::list(self, resource).await
    }

    async fn create(
        &self,
        resource: &R,
        draft: &R::Draft,
    ) -> Result<Saved<R::Entity>, GardenClientError> {
        HttpClient::create(self, resource, draft).await
    }

    async fn update(
        &self,
        resource: &R,
        id: i64,
        patch: &R::Patch,
    ) -> Result<Saved<R::Entity>, GardenClientError> {
        HttpClient::update(self, resource, id, patch).await
    }

    async fn delete(&self, resource: &R, id: i64) -> Result<(), GardenClientError> {
        HttpClient::delete(self, resource, id).await
    }
}
