use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::{FromResponse, Octocrab};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::discovery::{check_name, ApiRepository, RepoSource, RepositoryDescriptor};
use crate::error::{Error, Result};

const PER_PAGE: u32 = 100;

/// GitHub REST client bound to one token
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
    api_url: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    login: String,
}

impl GitHubClient {
    /// Create a client for `api_url` authenticating with `token`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/').to_string();

        let auth = format!("token {}", token);
        HeaderValue::from_str(&auth)
            .map_err(|_| Error::config("GitHub token contains invalid characters"))?;

        let client = Octocrab::builder()
            .add_retry_config(RetryConfig::None)
            .add_header(AUTHORIZATION, auth)
            .add_header(ACCEPT, "application/vnd.github+json".to_string())
            .base_uri(api_url.as_str())
            .map_err(|e| Error::config(format!("Invalid API URL {}: {}", api_url, e)))?
            .build()?;

        Ok(Self { client, api_url })
    }

    /// Resolve the login the token belongs to
    ///
    /// A rejected token is not retried.
    pub async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/user", self.api_url);
        debug!("Authenticating against {}", url);

        let response = self.client._get(url.as_str()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth { status });
        }

        let user = CurrentUser::from_response(response).await?;
        check_name(&user.login)?;

        info!("Authenticated as GitHub user: {}", user.login);
        Ok(user.login)
    }

    /// Start paging through every repository visible to the token
    pub fn repositories(&self) -> RepoPages {
        RepoPages {
            client: self.clone(),
            next_url: Some(format!("{}/user/repos?per_page={}", self.api_url, PER_PAGE)),
            pending: None,
            pages_fetched: 0,
        }
    }
}

/// Cursor over `GET /user/repos`, following `rel="next"` links
///
/// A record with an unsafe name ends the listing: the records before it on
/// the same page are still handed out, and the validation error is returned
/// by the following call to [`next_page`](RepoSource::next_page).
pub struct RepoPages {
    client: GitHubClient,
    next_url: Option<String>,
    pending: Option<Error>,
    pages_fetched: usize,
}

impl RepoPages {
    /// Number of pages fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Flatten the pages into a lazy stream of repositories
    ///
    /// Pages are still requested one at a time, only when the previous page
    /// has been consumed.
    pub fn into_stream(self) -> impl Stream<Item = Result<RepositoryDescriptor>> {
        stream::try_unfold(self, |mut pages| async move {
            if !pages.has_more() {
                return Ok::<_, Error>(None);
            }
            let page = pages.next_page().await?;
            Ok(Some((stream::iter(page.into_iter().map(Ok)), pages)))
        })
        .try_flatten()
    }
}

#[async_trait]
impl RepoSource for RepoPages {
    fn has_more(&self) -> bool {
        self.pending.is_some() || self.next_url.is_some()
    }

    async fn next_page(&mut self) -> Result<Vec<RepositoryDescriptor>> {
        if let Some(error) = self.pending.take() {
            return Err(error);
        }
        let Some(url) = self.next_url.take() else {
            return Ok(Vec::new());
        };

        debug!("Fetching repositories page {}: {}", self.pages_fetched + 1, url);

        let response = self.client.client._get(url.as_str()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api { url, status });
        }

        let next_url = next_link(response.headers(), &url)?;
        let records = Vec::<ApiRepository>::from_response(response).await?;
        self.pages_fetched += 1;

        let mut descriptors = Vec::with_capacity(records.len());
        for record in records {
            match RepositoryDescriptor::try_from(record) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    warn!("Listing stopped on page {}: {}", self.pages_fetched, e);
                    self.pending = Some(e);
                    return Ok(descriptors);
                }
            }
        }
        self.next_url = next_url;

        debug!(
            "Page {} returned {} repositories (more: {})",
            self.pages_fetched,
            descriptors.len(),
            self.next_url.is_some()
        );
        Ok(descriptors)
    }
}

/// Extract the `rel="next"` target from the `Link` headers of a response
///
/// Relative targets are resolved against `request_url`.
fn next_link(headers: &HeaderMap, request_url: &str) -> Result<Option<String>> {
    let base = Url::parse(request_url).map_err(|e| Error::Pagination {
        url: request_url.to_string(),
        detail: e.to_string(),
    })?;

    for value in headers.get_all(LINK) {
        let value = value.to_str().map_err(|e| Error::Pagination {
            url: request_url.to_string(),
            detail: e.to_string(),
        })?;
        let links = http_link::parse_link_header(value, &base).map_err(|e| Error::Pagination {
            url: request_url.to_string(),
            detail: e.to_string(),
        })?;

        if let Some(next) = links.into_iter().find(|link| link.rel == "next") {
            return Ok(Some(next.target.to_string()));
        }
    }

    Ok(None)
}
