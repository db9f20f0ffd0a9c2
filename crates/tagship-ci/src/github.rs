//! GitHub Releases publisher.
//!
//! Attaches an archive to the release named by a tag via the REST API:
//! find or create the release (pre-release), delete a same-named asset when
//! overwriting, then upload. An upload rejected because a concurrent job
//! attached the same name first is retried once after replacing that asset.
//! The token is passed through untouched.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use tagship_core::{ArchiveArtifact, PublishError, PublishRequest, ReleaseConfig, ReleasePublisher};

/// User-Agent header sent with every request.
const USER_AGENT: &str = concat!("tagship/", env!("CARGO_PKG_VERSION"));

const ACCEPT: &str = "application/vnd.github+json";

const API_VERSION: &str = "2022-11-28";

/// Uploads of large binaries can be slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub id: u64,
    pub tag_name: String,
    pub upload_url: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub id: u64,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// [`ReleasePublisher`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleasePublisher {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
}

impl GithubReleasePublisher {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Transport {
                operation: "build http client".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
        })
    }

    /// Build a publisher from the `[release]` section; both repository and
    /// token must be present.
    pub fn from_config(config: &ReleaseConfig) -> Result<Self, PublishError> {
        let repository = config
            .repository
            .clone()
            .ok_or_else(|| PublishError::NotConfigured("release.repository is not set".to_string()))?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| PublishError::NotConfigured("release token is not set".to_string()))?;
        Self::new(&config.api_url, repository, token)
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repository, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response, PublishError> {
        self.authed(builder)
            .send()
            .await
            .map_err(|e| PublishError::Transport {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }

    /// Fetch the release for `tag`, or `None` when it does not exist.
    pub async fn find_release(&self, tag: &str) -> Result<Option<GithubRelease>, PublishError> {
        let op = "get release";
        let response = self
            .send(op, self.client.get(self.repo_url(&format!("releases/tags/{tag}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(op, response).await.map(Some)
    }

    /// Create the release for `tag`.
    ///
    /// Another job may create it first; a 422 is resolved by fetching it.
    pub async fn create_release(
        &self,
        tag: &str,
        prerelease: bool,
    ) -> Result<GithubRelease, PublishError> {
        let op = "create release";
        let body = json!({
            "tag_name": tag,
            "name": tag,
            "prerelease": prerelease,
        });
        let response = self
            .send(op, self.client.post(self.repo_url("releases")).json(&body))
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(tag = %tag, "release already created concurrently");
            return self.find_release(tag).await?.ok_or_else(|| PublishError::Http {
                operation: op.to_string(),
                status: 422,
                body: format!("release {tag} neither created nor found"),
            });
        }
        let release: GithubRelease = parse_json(op, response).await?;
        info!(tag = %tag, release_id = release.id, prerelease, "created release");
        Ok(release)
    }

    pub async fn delete_asset(&self, asset_id: u64) -> Result<(), PublishError> {
        let op = "delete asset";
        let response = self
            .send(
                op,
                self.client
                    .delete(self.repo_url(&format!("releases/assets/{asset_id}"))),
            )
            .await?;
        // Already gone is as good as deleted.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(op, response).await.map(|_| ())
    }

    pub async fn upload_asset(
        &self,
        release: &GithubRelease,
        artifact: &ArchiveArtifact,
    ) -> Result<(), PublishError> {
        let op = "upload asset";
        let url = upload_endpoint(&release.upload_url);
        let builder = self
            .client
            .post(url)
            .query(&[("name", artifact.name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(artifact.bytes.clone());
        let response = self.send(op, builder).await?;
        check_status(op, response).await.map(|_| ())
    }

    /// Remove the asset named by `request` from `release` so it can be
    /// uploaded again. Returns whether an asset was removed.
    async fn clear_existing_asset(
        &self,
        release: &GithubRelease,
        request: &PublishRequest,
    ) -> Result<bool, PublishError> {
        let Some(existing) = release.assets.iter().find(|a| a.name == request.asset_name) else {
            return Ok(false);
        };
        if !request.options.overwrite {
            return Err(PublishError::AssetExists {
                tag: request.tag.clone(),
                asset: request.asset_name.clone(),
            });
        }
        debug!(asset = %existing.name, asset_id = existing.id, "replacing existing asset");
        self.delete_asset(existing.id).await?;
        Ok(true)
    }
}

#[async_trait]
impl ReleasePublisher for GithubReleasePublisher {
    async fn publish(
        &self,
        request: &PublishRequest,
        artifact: &ArchiveArtifact,
    ) -> Result<(), PublishError> {
        let release = match self.find_release(&request.tag).await? {
            Some(release) => release,
            None => {
                self.create_release(&request.tag, request.options.prerelease)
                    .await?
            }
        };

        self.clear_existing_asset(&release, request).await?;

        match self.upload_asset(&release, artifact).await {
            Ok(()) => {}
            // 422 on upload means the name was taken after the release was listed.
            Err(err @ PublishError::Http { status: 422, .. }) => {
                debug!(asset = %request.asset_name, "asset attached concurrently; retrying upload");
                let Some(current) = self.find_release(&request.tag).await? else {
                    return Err(err);
                };
                if !self.clear_existing_asset(&current, request).await? {
                    return Err(err);
                }
                self.upload_asset(&current, artifact).await?;
            }
            Err(err) => return Err(err),
        }
        info!(
            tag = %request.tag,
            asset = %request.asset_name,
            size = artifact.size(),
            "published release asset"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip the RFC 6570 `{?name,label}` template from a release `upload_url`.
pub fn upload_endpoint(upload_url: &str) -> &str {
    upload_url
        .split_once('{')
        .map(|(base, _)| base)
        .unwrap_or(upload_url)
}

async fn check_status(operation: &str, response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PublishError::Http {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, PublishError> {
    check_status(operation, response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| PublishError::Transport {
            operation: operation.to_string(),
            message: format!("invalid response body: {e}"),
        })
}
