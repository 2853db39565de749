//! Modrinth registry client: source parsing and version resolution.

use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ApiError, ModError, ModResult};
use crate::health::HealthCheck;
use crate::types::ModVersionInfo;

/// Extracts the project identifier from a configured source.
///
/// A source without any `/` is taken as the identifier itself. Otherwise the
/// segment following the last `/mod/` up to the next `/` is used, so
/// `https://modrinth.com/mod/sodium/versions` resolves to `sodium`.
pub fn parse_project_id(source: &str) -> ModResult<String> {
    if !source.contains('/') {
        return Ok(source.to_string());
    }

    source
        .rfind("/mod/")
        .map(|idx| &source[idx + "/mod/".len()..])
        .map(|rest| rest.trim_start_matches('/'))
        .and_then(|rest| rest.split('/').next())
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ModError::InvalidSource(source.to_string()))
}

#[derive(Debug, Deserialize)]
struct RegistryVersion {
    id: String,
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    files: Vec<RegistryFile>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    url: String,
    filename: String,
}

/// Turns a non-2xx response into an [`ApiError`] naming the endpoint.
pub(crate) fn ensure_success(
    url: &str,
    response: Response,
    message: &str,
) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::new(url, status.as_u16(), message))
    }
}

/// Thin client over the registry's version listing endpoint.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
    game_version: String,
    loader: String,
}

impl RegistryClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        game_version: impl Into<String>,
        loader: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            game_version: game_version.into(),
            loader: loader.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the newest release compatible with the configured game
    /// version and loader; one attempt, no retries.
    ///
    /// The registry returns versions newest first and already filtered by
    /// the query, so the first entry is taken. Its declared game versions
    /// and loaders are cross-checked only to emit a warning.
    pub async fn latest_version(
        &self,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> ModResult<ModVersionInfo> {
        let url = format!("{}/project/{}/version", self.base_url, project_id);
        let request = self.http.get(&url).query(&[
            ("game_versions", format!("[\"{}\"]", self.game_version)),
            ("loaders", format!("[\"{}\"]", self.loader)),
        ]);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ModError::Cancelled),
            sent = request.send() => sent.map_err(|source| ModError::Http { url: url.clone(), source })?,
        };
        let response = ensure_success(&url, response, "request failed")?;

        let versions: Vec<RegistryVersion> = tokio::select! {
            _ = cancel.cancelled() => return Err(ModError::Cancelled),
            body = response.json() => body.map_err(|source| ModError::Decode { url: url.clone(), source })?,
        };

        let latest = versions
            .into_iter()
            .next()
            .ok_or_else(|| ModError::NoCompatibleVersion(project_id.to_string()))?;

        if !latest.game_versions.is_empty() && !latest.game_versions.contains(&self.game_version) {
            warn!(
                project = project_id,
                version = %latest.version_number,
                expected = %self.game_version,
                "Registry returned a version not tagged for the target game version"
            );
        }
        if !latest.loaders.is_empty() && !latest.loaders.contains(&self.loader) {
            warn!(
                project = project_id,
                version = %latest.version_number,
                expected = %self.loader,
                "Registry returned a version not tagged for the target loader"
            );
        }

        let file = latest
            .files
            .into_iter()
            .next()
            .ok_or_else(|| ModError::NoFiles {
                project: project_id.to_string(),
                version: latest.version_number.clone(),
            })?;

        debug!(project = project_id, version = %latest.version_number, file = %file.filename, "Resolved latest version");
        Ok(ModVersionInfo {
            project_id: project_id.to_string(),
            version_id: latest.id,
            version_number: latest.version_number,
            download_url: file.url,
            filename: file.filename,
        })
    }

    /// Reachability probe against the API root, bounded by `timeout`.
    pub async fn probe(&self, timeout: Duration) -> HealthCheck {
        const NAME: &str = "Modrinth API";
        let url = format!("{}/", self.base_url);

        match tokio::time::timeout(timeout, self.http.get(&url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => HealthCheck::ok(NAME, "Connected"),
            Ok(Ok(response)) => HealthCheck::warn(NAME, format!("Status {}", response.status().as_u16())),
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "Registry probe failed");
                HealthCheck::error(NAME, "Connection failed")
            }
            Err(_) => HealthCheck::error(NAME, "Connection failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RegistryClient {
        RegistryClient::new(Client::new(), server.uri(), "1.20.1", "fabric")
    }

    #[test]
    fn test_parse_project_id() {
        assert_eq!(parse_project_id("sodium").unwrap(), "sodium");
        assert_eq!(
            parse_project_id("https://modrinth.com/mod/fabric-api").unwrap(),
            "fabric-api"
        );
        assert_eq!(
            parse_project_id("https://modrinth.com/mod/lithium/versions").unwrap(),
            "lithium"
        );
        assert!(matches!(
            parse_project_id("https://example.com/a/b"),
            Err(ModError::InvalidSource(_))
        ));
        assert!(matches!(
            parse_project_id("https://modrinth.com/mod/"),
            Err(ModError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_version_takes_first_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/sodium/version"))
            .and(query_param("game_versions", "[\"1.20.1\"]"))
            .and(query_param("loaders", "[\"fabric\"]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "v2",
                    "version_number": "0.5.3",
                    "game_versions": ["1.20.1"],
                    "loaders": ["fabric"],
                    "files": [{"url": "https://cdn/sodium-0.5.3.jar", "filename": "sodium-0.5.3.jar"}]
                },
                {
                    "id": "v1",
                    "version_number": "0.5.2",
                    "files": [{"url": "https://cdn/sodium-0.5.2.jar", "filename": "sodium-0.5.2.jar"}]
                }
            ])))
            .mount(&server)
            .await;

        let info = client(&server)
            .latest_version("sodium", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(info.version_id, "v2");
        assert_eq!(info.filename, "sodium-0.5.3.jar");
        assert_eq!(info.download_url, "https://cdn/sodium-0.5.3.jar");
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_compatible_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/old/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = client(&server)
            .latest_version("old", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModError::NoCompatibleVersion(ref id) if id == "old"));
    }

    #[tokio::test]
    async fn test_version_without_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/bare/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "v1", "version_number": "1.0", "files": []}
            ])))
            .mount(&server)
            .await;

        let err = client(&server)
            .latest_version("bare", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModError::NoFiles { .. }));
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .latest_version("missing", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ModError::Api(api) => {
                assert_eq!(api.status, 404);
                assert!(api.url.ends_with("/project/missing/version"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_probe_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let check = client(&server).probe(Duration::from_secs(5)).await;
        assert_eq!(check.status, HealthStatus::Ok);
        assert_eq!(check.message, "Connected");

        let degraded = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&degraded)
            .await;
        let check = client(&degraded).probe(Duration::from_secs(5)).await;
        assert_eq!(check.status, HealthStatus::Warn);
        assert_eq!(check.message, "Status 503");
    }
}
