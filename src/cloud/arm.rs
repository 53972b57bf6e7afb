//! Azure Resource Manager client.

use super::CloudResourceClient;
use crate::config::AzureOptions;
use crate::error::{Result, TenantGraphError};
use crate::types::{Resource, ResourceId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Fetches single resources with `GET {endpoint}{id}?api-version=...`.
///
/// Resource Manager insists on an API version per provider type; the
/// configured `api_versions` map (keyed case-insensitively by full provider
/// type) wins over `default_api_version`.
#[derive(Debug, Clone)]
pub struct ArmClient {
    client: Client,
    endpoint: String,
    access_token: String,
    default_api_version: String,
    api_versions: HashMap<String, String>,
}

impl ArmClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when no access token is configured.
    pub fn new(options: &AzureOptions, timeout: Duration) -> Result<Self> {
        let access_token = options
            .access_token
            .clone()
            .ok_or_else(|| crate::err!(ConfigMissing {
                key: "azure.access_token (or TG_AZURE_TOKEN)".to_string(),
            }))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tenantgraph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TenantGraphError::internal(format!("Failed to create HTTP client: {e}"), file!(), line!()))?;

        Ok(Self {
            client,
            endpoint: options.management_endpoint.trim_end_matches('/').to_string(),
            access_token,
            default_api_version: options.default_api_version.clone(),
            api_versions: options
                .api_versions
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        })
    }

    fn api_version_for(&self, id: &str) -> String {
        ResourceId::parse(id)
            .ok()
            .and_then(|parsed| parsed.resource_type().map(str::to_ascii_lowercase))
            .and_then(|resource_type| self.api_versions.get(&resource_type).cloned())
            .unwrap_or_else(|| self.default_api_version.clone())
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[async_trait]
impl CloudResourceClient for ArmClient {
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Resource>> {
        let url = format!("{}{}", self.endpoint, id.trim_end_matches('/'));
        let api_version = self.api_version_for(id);
        tracing::trace!(resource_id = %id, api_version = %api_version, "Fetching resource");

        let response = self
            .client
            .get(&url)
            .query(&[("api-version", api_version.as_str())])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| crate::err!(CloudApi {
                resource_id: id.to_string(),
                message: format!("HTTP request failed: {e}"),
                status_code: None,
            }))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(crate::err!(Throttled {
                resource_id: id.to_string(),
                retry_after_secs: retry_after_secs(&response),
            }));
        }
        if !status.is_success() {
            return Err(crate::err!(CloudApi {
                resource_id: id.to_string(),
                message: format!("Status {status}"),
                status_code: Some(status.as_u16()),
            }));
        }

        let document: Value = response.json().await.map_err(|e| crate::err!(CloudApi {
            resource_id: id.to_string(),
            message: format!("Failed to parse resource payload: {e}"),
            status_code: Some(status.as_u16()),
        }))?;

        Resource::from_arm(document).map(Some).ok_or_else(|| crate::err!(CloudApi {
            resource_id: id.to_string(),
            message: "Resource payload has no id".to_string(),
            status_code: Some(status.as_u16()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    const SUBNET: &str = "/subscriptions/0000/resourceGroups/hub-rg/providers/Microsoft.Network/virtualNetworks/hub-vnet/subnets/default";

    fn client(endpoint: &str) -> ArmClient {
        let mut options = AzureOptions {
            management_endpoint: endpoint.to_string(),
            access_token: Some("token".to_string()),
            ..AzureOptions::default()
        };
        options.api_versions.insert(
            "Microsoft.Network/virtualNetworks/subnets".to_string(),
            "2023-09-01".to_string(),
        );
        ArmClient::new(&options, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SUBNET))
            .and(query_param("api-version", "2023-09-01"))
            .and(header("Authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": SUBNET,
                "name": "default",
                "type": "Microsoft.Network/virtualNetworks/subnets",
                "properties": { "addressPrefix": "10.0.1.0/24" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resource = client(&server.uri()).fetch_by_id(SUBNET).await.unwrap().unwrap();
        assert_eq!(resource.id, SUBNET);
        assert_eq!(resource.resource_group.as_deref(), Some("hub-rg"));
        assert_eq!(resource.canonical_type(), "subnets");
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server.uri()).fetch_by_id(SUBNET).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_throttled_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).fetch_by_id(SUBNET).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_fetch_forbidden_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server.uri()).fetch_by_id(SUBNET).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_default_api_version_fallback() {
        let arm = client("https://management.azure.com");
        assert_eq!(
            arm.api_version_for("/subscriptions/0/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm"),
            AzureOptions::default().default_api_version
        );
        assert_eq!(arm.api_version_for(&SUBNET.to_uppercase()), "2023-09-01");
    }

    #[test]
    fn test_missing_token() {
        let options = AzureOptions { access_token: None, ..AzureOptions::default() };
        assert!(ArmClient::new(&options, Duration::from_secs(1)).is_err());
    }
}
