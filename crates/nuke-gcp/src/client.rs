//! Google Cloud REST client shared by every resource kind.

use nuke_core::{BackendError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
pub const CONTAINER_API: &str = "https://container.googleapis.com/v1";
pub const PUBSUB_API: &str = "https://pubsub.googleapis.com/v1";
pub const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const IAM_API: &str = "https://iam.googleapis.com/v1";

/// Environment variable holding an OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Base URLs of the APIs in use.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub compute: String,
    pub container: String,
    pub pubsub: String,
    pub bigquery: String,
    pub iam: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: COMPUTE_API.to_string(),
            container: CONTAINER_API.to_string(),
            pubsub: PUBSUB_API.to_string(),
            bigquery: BIGQUERY_API.to_string(),
            iam: IAM_API.to_string(),
        }
    }
}

/// OAuth bearer token.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// Use `explicit` if given, else ask the gcloud CLI.
    pub async fn resolve(explicit: Option<String>) -> Result<Self> {
        match explicit.filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(Self::new(token)),
            None => Self::from_gcloud().await,
        }
    }

    /// Fetch a token from `gcloud auth print-access-token`.
    pub async fn from_gcloud() -> Result<Self> {
        debug!("Requesting access token from gcloud");
        let output = tokio::process::Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| BackendError::Auth(format!("failed to run gcloud: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Auth(format!(
                "gcloud auth print-access-token failed: {}",
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(BackendError::Auth("gcloud returned an empty token".to_string()));
        }
        Ok(Self(token))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// Google Cloud API client.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: reqwest::Client,
    token: AccessToken,
    endpoints: Arc<Endpoints>,
}

impl GcpClient {
    pub fn new(token: AccessToken) -> Self {
        Self::with_endpoints(token, Endpoints::default())
    }

    pub fn with_endpoints(token: AccessToken, endpoints: Endpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            endpoints: Arc::new(endpoints),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// `{compute}/projects/{project}/{path}`
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.compute, project, path)
    }

    /// `{container}/{resource}` for a full resource name like `projects/p/locations/l/clusters/c`.
    pub fn container_url(&self, resource: &str) -> String {
        format!("{}/{}", self.endpoints.container, resource)
    }

    /// `{pubsub}/{resource}` for a full resource name like `projects/p/topics/t`.
    pub fn pubsub_url(&self, resource: &str) -> String {
        format!("{}/{}", self.endpoints.pubsub, resource)
    }

    /// `{bigquery}/projects/{project}/{path}`
    pub fn bigquery_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{}/{}", self.endpoints.bigquery, project, path)
    }

    /// `{iam}/{resource}` for a full resource name like `projects/p/serviceAccounts/a`.
    pub fn iam_url(&self, resource: &str) -> String {
        format!("{}/{}", self.endpoints.iam, resource)
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.token.bearer())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "DELETE");
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.token.bearer())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(url)
            .header("Authorization", self.token.bearer())
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    /// GET every page of a list call and collect the entries under `field`.
    pub async fn list_all<T: DeserializeOwned>(&self, url: &str, field: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = with_page_token(url, page_token.as_deref())?;
            let page: Value = self.get(&page_url).await?;
            let (entries, next) = split_page(page, field)?;
            items.extend(entries);

            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(items),
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &body));
        }

        // some deletes answer with an empty body
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn with_page_token(url: &str, page_token: Option<&str>) -> Result<String> {
    let Some(token) = page_token else {
        return Ok(url.to_string());
    };
    let mut url = Url::parse(url).map_err(|e| BackendError::other(format!("invalid URL {url}: {e}")))?;
    url.query_pairs_mut().append_pair("pageToken", token);
    Ok(url.into())
}

/// Entries under `field` and the next page token of one list response.
fn split_page<T: DeserializeOwned>(mut page: Value, field: &str) -> Result<(Vec<T>, Option<String>)> {
    let next = page
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let entries = match page.get_mut(field).map(Value::take) {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(|e| BackendError::Decode(format!("{field}: {e}")))?,
        // empty collections omit the field
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(BackendError::Decode(format!(
                "expected an array under {field}, got {other}"
            )));
        }
    };

    Ok((entries, next))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// Turn a non-success response into `BackendError::Api`.
///
/// The reason is the first of `errors[].reason`, `details[].reason` and
/// `status` that is present.
pub fn decode_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => {
            let reason = error
                .errors
                .iter()
                .find_map(|e| e.reason.clone())
                .or_else(|| error.details.iter().find_map(|d| d.reason.clone()))
                .or(error.status);
            BackendError::Api {
                status,
                reason,
                message: error.message,
            }
        }
        Err(_) => BackendError::Api {
            status,
            reason: None,
            message: body.trim().to_string(),
        },
    }
}

/// True when the API is not enabled for the project (nothing to tear down).
pub fn is_service_disabled(error: &BackendError) -> bool {
    matches!(
        error,
        BackendError::Api { status: 403, reason: Some(reason), .. }
            if reason == "SERVICE_DISABLED" || reason == "accessNotConfigured"
    )
}

/// Last path segment of a resource URL, e.g. the zone name of a zone URL.
pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuke_core::{ErrorClass, TransientReason, classify};
    use serde_json::json;

    fn client() -> GcpClient {
        GcpClient::with_endpoints(
            AccessToken::new("token"),
            Endpoints {
                compute: "http://compute.test/compute/v1".to_string(),
                container: "http://container.test/v1".to_string(),
                pubsub: "http://pubsub.test/v1".to_string(),
                bigquery: "http://bigquery.test/bigquery/v2".to_string(),
                iam: "http://iam.test/v1".to_string(),
            },
        )
    }

    #[test]
    fn test_decode_compute_error() {
        let body = json!({
            "error": {
                "code": 400,
                "message": "The network resource 'projects/p/global/networks/default' is already being used by 'projects/p/global/firewalls/allow-ssh'",
                "errors": [{
                    "message": "The network resource is already being used",
                    "domain": "global",
                    "reason": "resourceInUseByAnotherResource"
                }]
            }
        });

        let err = decode_error(400, &body.to_string());
        assert!(matches!(
            &err,
            BackendError::Api { status: 400, reason: Some(r), .. } if r == "resourceInUseByAnotherResource"
        ));
        assert_eq!(classify(&err), ErrorClass::Transient(TransientReason::InUse));
        assert!(err.to_string().starts_with("Error 400: The network resource"));
        assert!(err.to_string().ends_with(", resourceInUseByAnotherResource"));
    }

    #[test]
    fn test_decode_service_disabled() {
        let body = json!({
            "error": {
                "code": 403,
                "message": "Kubernetes Engine API has not been used in project 123 before or it is disabled.",
                "status": "PERMISSION_DENIED",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "SERVICE_DISABLED",
                    "domain": "googleapis.com"
                }]
            }
        });

        let err = decode_error(403, &body.to_string());
        assert!(is_service_disabled(&err));
        assert_eq!(classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn test_decode_error_falls_back_to_status() {
        let body = json!({"error": {"code": 409, "message": "busy", "status": "ABORTED"}});
        let err = decode_error(409, &body.to_string());
        assert!(matches!(err, BackendError::Api { reason: Some(ref r), .. } if r == "ABORTED"));
    }

    #[test]
    fn test_decode_non_json_error() {
        let err = decode_error(502, "<html>Bad Gateway</html>\n");
        assert!(matches!(
            err,
            BackendError::Api { status: 502, reason: None, ref message } if message == "<html>Bad Gateway</html>"
        ));
    }

    #[test]
    fn test_not_found_is_stale_listing() {
        let body = json!({"error": {"code": 404, "message": "The resource 'projects/p/zones/z/instances/vm-1' was not found", "errors": [{"reason": "notFound"}]}});
        let err = decode_error(404, &body.to_string());
        assert_eq!(
            classify(&err),
            ErrorClass::Transient(TransientReason::StaleListing)
        );
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.compute_url("p", "zones/europe-west1-b/instances"),
            "http://compute.test/compute/v1/projects/p/zones/europe-west1-b/instances"
        );
        assert_eq!(
            client.container_url("projects/p/locations/-/clusters"),
            "http://container.test/v1/projects/p/locations/-/clusters"
        );
        assert_eq!(
            client.pubsub_url("projects/p/topics"),
            "http://pubsub.test/v1/projects/p/topics"
        );
        assert_eq!(
            client.bigquery_url("p", "datasets/logs"),
            "http://bigquery.test/bigquery/v2/projects/p/datasets/logs"
        );
        assert_eq!(
            client.iam_url("projects/p/serviceAccounts"),
            "http://iam.test/v1/projects/p/serviceAccounts"
        );
    }

    #[test]
    fn test_page_token_appended() {
        let url = "http://compute.test/compute/v1/projects/p/global/networks";
        assert_eq!(with_page_token(url, None).unwrap(), url);
        assert_eq!(
            with_page_token(url, Some("abc/def")).unwrap(),
            "http://compute.test/compute/v1/projects/p/global/networks?pageToken=abc%2Fdef"
        );
        assert_eq!(
            with_page_token(&format!("{url}?filter=x"), Some("t")).unwrap(),
            format!("{url}?filter=x&pageToken=t")
        );
    }

    #[test]
    fn test_split_page() {
        let page = json!({
            "items": [{"name": "a"}, {"name": "b"}],
            "nextPageToken": "next"
        });
        let (names, next): (Vec<Value>, _) = split_page(page, "items").unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(next.as_deref(), Some("next"));

        let (empty, next): (Vec<Value>, _) = split_page(json!({"kind": "compute#networkList"}), "items").unwrap();
        assert!(empty.is_empty());
        assert!(next.is_none());

        assert!(split_page::<Value>(json!({"items": "nope"}), "items").is_err());
    }

    #[test]
    fn test_token_is_redacted() {
        let token = AccessToken::new("  ya29.secret\n");
        assert_eq!(format!("{token:?}"), "AccessToken(..)");
        assert_eq!(token.bearer(), "Bearer ya29.secret");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(
            last_segment("https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b"),
            "us-east1-b"
        );
        assert_eq!(last_segment("plain"), "plain");
    }
}
