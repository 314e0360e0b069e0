//! HTTP client for the hosted VCS API.

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::UpstreamError;
use super::models::{
    AccessToken, CreateAccessTokenOption, CreateRepoOption, CreateTeamOption, Organization,
    Repository, Team, User,
};

/// One authenticated view of the upstream service.
///
/// Constructing a client does no I/O; the token alone authenticates every
/// call. Clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Some(token.into()),
            http: reqwest::Client::new(),
        }
    }

    /// Client without a token; only the basic-auth token endpoints work.
    pub fn anonymous(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Same server and connection pool, acting with another token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: Some(token.into()),
            http: self.http.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn current_user(&self) -> Result<User, UpstreamError> {
        self.get(&["user"]).await
    }

    pub async fn list_access_tokens(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<AccessToken>, UpstreamError> {
        let req = self
            .unauthenticated(Method::GET, &["users", username, "tokens"])?
            .basic_auth(username, Some(password));
        decode(req).await
    }

    pub async fn create_access_token(
        &self,
        username: &str,
        password: &str,
        opts: &CreateAccessTokenOption,
    ) -> Result<AccessToken, UpstreamError> {
        let req = self
            .unauthenticated(Method::POST, &["users", username, "tokens"])?
            .basic_auth(username, Some(password))
            .json(opts);
        decode(req).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organisations and teams
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_my_orgs(&self) -> Result<Vec<Organization>, UpstreamError> {
        self.get(&["user", "orgs"]).await
    }

    pub async fn list_teams(&self, org: &str) -> Result<Vec<Team>, UpstreamError> {
        self.get(&["orgs", org, "teams"]).await
    }

    pub async fn create_org_repo(
        &self,
        org: &str,
        opts: &CreateRepoOption,
    ) -> Result<Repository, UpstreamError> {
        self.send_json(Method::POST, &["org", org, "repos"], opts).await
    }

    pub async fn admin_create_team(
        &self,
        org: &str,
        opts: &CreateTeamOption,
    ) -> Result<Team, UpstreamError> {
        self.send_json(Method::POST, &["admin", "orgs", org, "teams"], opts)
            .await
    }

    pub async fn admin_add_team_member(&self, team_id: i64, username: &str) -> Result<(), UpstreamError> {
        let team = team_id.to_string();
        self.put_empty(&["admin", "teams", &team, "members", username])
            .await
    }

    pub async fn admin_add_team_repo(&self, team_id: i64, repo: &str) -> Result<(), UpstreamError> {
        let team = team_id.to_string();
        self.put_empty(&["admin", "teams", &team, "repos", repo]).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| UpstreamError::Network(format!("invalid base url {:?}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Network(format!("invalid base url {:?}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    /// Request without the token header, for endpoints that take basic auth.
    fn unauthenticated(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, UpstreamError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "upstream request");
        Ok(self.http.request(method, url))
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, UpstreamError> {
        let req = self.unauthenticated(method, segments)?;
        Ok(match &self.token {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, format!("token {token}")),
            None => req,
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, UpstreamError> {
        decode(self.request(Method::GET, segments)?).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, UpstreamError> {
        decode(self.request(method, segments)?.json(body)).await
    }

    async fn put_empty(&self, segments: &[&str]) -> Result<(), UpstreamError> {
        send(self.request(Method::PUT, segments)?).await.map(|_| ())
    }
}

async fn send(req: RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
    let resp = req
        .send()
        .await
        .map_err(|e| UpstreamError::Network(e.to_string()))?;

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, UpstreamError> {
    send(req)
        .await?
        .json()
        .await
        .map_err(|e| UpstreamError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_api_v1() {
        let client = UpstreamClient::new("https://vcs.example.org/", "abc");
        let url = client.url(&["orgs", "lab one", "teams"]).unwrap();
        assert_eq!(url.as_str(), "https://vcs.example.org/api/v1/orgs/lab%20one/teams");

        let nested = UpstreamClient::new("https://example.org/vcs", "abc");
        assert_eq!(
            nested.url(&["user"]).unwrap().as_str(),
            "https://example.org/vcs/api/v1/user"
        );
    }

    #[test]
    fn bad_base_url_is_reported() {
        let client = UpstreamClient::new("not a url", "abc");
        assert!(matches!(client.url(&["user"]), Err(UpstreamError::Network(_))));
    }

    #[test]
    fn with_token_keeps_server() {
        let bot = UpstreamClient::new("http://localhost:3000", "bot");
        let user = bot.with_token("user");
        assert_eq!(user.base_url(), "http://localhost:3000");
        assert_eq!(user.token(), Some("user"));
        assert_eq!(bot.token(), Some("bot"));
    }
}
