//! Content-management REST API client.
//!
//! [`CmaClient`] implements [`ContentSource`] over HTTP. Entry writes carry the version read
//! beforehand in the `X-Contentful-Version` header; a `409` answer is reported as
//! [`ReftreeError::Conflict`].

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    StatusCode,
};
use serde_json::{json, Value};
use url::Url;

use crate::{
    config::ReftreeConfig,
    error::ReftreeError,
    locator::{EntryLocator, SpaceLocator},
    properties::{AssetRecord, Fields, ResolvedEntry},
    source::ContentSource,
};

const CMA_MEDIA_TYPE: &str = "application/vnd.contentful.management.v1+json";
const VERSION_HEADER: &str = "X-Contentful-Version";
const CONTENT_TYPE_HEADER: &str = "X-Contentful-Content-Type";
const USER_AGENT_VALUE: &str = concat!("reftree/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct CmaClient {
    client: reqwest::Client,
    base_url: Url,
    space: SpaceLocator,
    locale: String,
}

impl CmaClient {
    /// Client for `space` at `base_url`, authenticated with `token`.
    pub fn new(
        base_url: &str,
        space: SpaceLocator,
        locale: impl Into<String>,
        token: &str,
    ) -> Result<Self, ReftreeError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ReftreeError::Config(format!("invalid access token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CMA_MEDIA_TYPE));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ReftreeError::Transport(format!("failed to create HTTP client: {e}")))?;

        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(CmaClient {
            client,
            base_url: Url::parse(&base)?,
            space,
            locale: locale.into(),
        })
    }

    pub fn from_config(config: &ReftreeConfig, token: &str) -> Result<Self, ReftreeError> {
        if config.api.space_id.is_empty() {
            return Err(ReftreeError::Config("api.space_id is not set".to_string()));
        }
        CmaClient::new(
            &config.api.base_url,
            SpaceLocator::new(&config.api.space_id, &config.api.environment_id),
            &config.locale,
            token,
        )
    }

    fn url(&self, space: &SpaceLocator, path: &str) -> Result<Url, ReftreeError> {
        Ok(self.base_url.join(&format!(
            "spaces/{}/environments/{}/{path}",
            space.space_id, space.environment_id
        ))?)
    }

    /// Map a non-success status to an error, otherwise decode the body.
    async fn handle_response(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<Value, ReftreeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Content API error ({status}) for {context}: {body}");
            return Err(ReftreeError::from_status(status, context));
        }
        Ok(response.json().await?)
    }

    async fn read_entry(&self, url: Url, context: &str) -> Result<ResolvedEntry, ReftreeError> {
        tracing::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let value = self.handle_response(response, context).await?;
        ResolvedEntry::from_cma_value(value, &self.locale)
    }

    async fn versioned_put(
        &self,
        url: Url,
        id: &str,
        version: u64,
        body: Option<Value>,
    ) -> Result<ResolvedEntry, ReftreeError> {
        tracing::debug!("PUT {url} (version {version})");
        let mut request = self.client.put(url).header(VERSION_HEADER, version);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(&body)?);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(ReftreeError::Conflict {
                id: id.to_string(),
                expected: version,
            });
        }
        let value = self.handle_response(response, id).await?;
        ResolvedEntry::from_cma_value(value, &self.locale)
    }
}

impl ContentSource for CmaClient {
    async fn get_entry(&self, id: &str) -> Result<ResolvedEntry, ReftreeError> {
        let url = self.url(&self.space, &format!("entries/{id}"))?;
        self.read_entry(url, id).await
    }

    async fn get_entry_at(&self, locator: &EntryLocator) -> Result<ResolvedEntry, ReftreeError> {
        let url = self.url(&locator.space, &format!("entries/{}", locator.entry_id))?;
        self.read_entry(url, &locator.to_string()).await
    }

    async fn update_entry(
        &self,
        id: &str,
        version: u64,
        fields: &Fields,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let url = self.url(&self.space, &format!("entries/{id}"))?;
        self.versioned_put(url, id, version, Some(json!({ "fields": fields })))
            .await
    }

    async fn create_entry(
        &self,
        content_type: &str,
        fields: &Fields,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let url = self.url(&self.space, "entries")?;
        tracing::debug!("POST {url} ({content_type})");
        let body = serde_json::to_vec(&json!({ "fields": fields }))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE_HEADER, content_type)
            .body(body)
            .send()
            .await?;
        let value = self.handle_response(response, content_type).await?;
        ResolvedEntry::from_cma_value(value, &self.locale)
    }

    async fn publish_entry(&self, id: &str, version: u64) -> Result<ResolvedEntry, ReftreeError> {
        let url = self.url(&self.space, &format!("entries/{id}/published"))?;
        self.versioned_put(url, id, version, None).await
    }

    async fn get_asset(&self, id: &str) -> Result<AssetRecord, ReftreeError> {
        let url = self.url(&self.space, &format!("assets/{id}"))?;
        tracing::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let value = self.handle_response(response, id).await?;
        AssetRecord::from_cma_value(&value, &self.locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_scoped_to_space_and_environment() {
        let client = CmaClient::new(
            "https://api.example.com",
            SpaceLocator::new("space1", "master"),
            "en-US",
            "token",
        )
        .unwrap();
        let url = client
            .url(&SpaceLocator::new("shared", "staging"), "entries/abc/published")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/spaces/shared/environments/staging/entries/abc/published"
        );
    }

    #[test]
    fn test_missing_space_is_a_config_error() {
        let config = ReftreeConfig::default();
        assert!(matches!(
            CmaClient::from_config(&config, "token"),
            Err(ReftreeError::Config(_))
        ));
    }
}
