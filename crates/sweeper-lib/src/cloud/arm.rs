//! Azure Resource Manager REST adapter
//!
//! Talks to the management-plane list endpoints (paged `value`/`nextLink`
//! envelopes), the per-VM `instanceView`, and the `deallocate`/`powerOff`
//! actions. Authentication is a pre-acquired bearer token handed in by
//! configuration; acquiring it is outside this crate.

use super::{CloudError, CloudInventory};
use crate::models::{Subscription, VmResource};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const COMPUTE_API_VERSION: &str = "2024-03-01";

/// REST client for the Azure management plane
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

/// Paged list envelope returned by ARM collection endpoints
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    subscription_id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmEntry {
    id: String,
    name: String,
    // ARM serializes an untagged VM as either a missing field or null
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct InstanceViewBody {
    #[serde(default = "Vec::new")]
    statuses: Vec<InstanceViewStatus>,
}

#[derive(Debug, Deserialize)]
struct InstanceViewStatus {
    code: Option<String>,
}

impl ArmClient {
    /// Create a client against the given management endpoint
    /// (`https://management.azure.com` outside of tests).
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        Self {
            http,
            endpoint,
            token: token.into(),
        }
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CloudError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CloudError::Api {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        operation: &'static str,
    ) -> Result<T, CloudError> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = Self::check(operation, response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Fetch a full collection, following `nextLink` pages to the end
    async fn get_paged<T: DeserializeOwned>(
        &self,
        first_url: String,
        operation: &'static str,
    ) -> Result<Vec<T>, CloudError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url, operation).await?;
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }

    async fn post_action(&self, vm_id: &str, action: &'static str) -> Result<(), CloudError> {
        let url = format!(
            "{}{}/{}?api-version={}",
            self.endpoint, vm_id, action, COMPUTE_API_VERSION
        );
        let response = self.http.post(&url).bearer_auth(&self.token).send().await?;
        Self::check(action, response).await?;
        debug!(vm = %vm_id, action, "Power operation accepted");
        Ok(())
    }
}

#[async_trait]
impl CloudInventory for ArmClient {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, CloudError> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.endpoint, SUBSCRIPTIONS_API_VERSION
        );
        let entries: Vec<SubscriptionEntry> = self.get_paged(url, "list subscriptions").await?;
        Ok(entries
            .into_iter()
            .map(|entry| Subscription {
                subscription_id: entry.subscription_id,
                display_name: entry.display_name,
            })
            .collect())
    }

    async fn list_virtual_machines(
        &self,
        subscription: &Subscription,
    ) -> Result<Vec<VmResource>, CloudError> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/virtualMachines?api-version={}",
            self.endpoint, subscription.subscription_id, COMPUTE_API_VERSION
        );
        let entries: Vec<VmEntry> = self.get_paged(url, "list virtual machines").await?;
        Ok(entries
            .into_iter()
            .map(|entry| VmResource {
                id: entry.id,
                name: entry.name,
                tags: entry.tags.unwrap_or_default(),
            })
            .collect())
    }

    async fn instance_status(&self, vm_id: &str) -> Result<Vec<String>, CloudError> {
        let url = format!(
            "{}{}/instanceView?api-version={}",
            self.endpoint, vm_id, COMPUTE_API_VERSION
        );
        let body: InstanceViewBody = self.get_json(&url, "get instance view").await?;
        Ok(body
            .statuses
            .into_iter()
            .filter_map(|status| status.code)
            .collect())
    }

    async fn deallocate(&self, vm_id: &str) -> Result<(), CloudError> {
        self.post_action(vm_id, "deallocate").await
    }

    async fn power_off(&self, vm_id: &str) -> Result<(), CloudError> {
        self.post_action(vm_id, "powerOff").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const VM_ID: &str =
        "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm-1";

    fn client(server: &mockito::Server) -> ArmClient {
        ArmClient::new(server.url(), "test-token", reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_list_subscriptions_follows_next_link() {
        let mut server = mockito::Server::new_async().await;

        let second_page = format!("{}/subscriptions-page-2", server.url());
        let first = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                SUBSCRIPTIONS_API_VERSION.into(),
            ))
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"value":[{{"subscriptionId":"sub-1","displayName":"First"}}],"nextLink":"{second_page}"}}"#
            ))
            .create_async()
            .await;
        let second = server
            .mock("GET", "/subscriptions-page-2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value":[{"subscriptionId":"sub-2"}]}"#)
            .create_async()
            .await;

        let subscriptions = client(&server).list_subscriptions().await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(subscriptions.len(), 2);
        assert_eq!(subscriptions[0].subscription_id, "sub-1");
        assert_eq!(subscriptions[0].display_name.as_deref(), Some("First"));
        assert_eq!(subscriptions[1].subscription_id, "sub-2");
        assert!(subscriptions[1].display_name.is_none());
    }

    #[tokio::test]
    async fn test_list_virtual_machines_handles_null_tags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines",
            )
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"value":[
                    {{"id":"{VM_ID}","name":"vm-1","tags":{{"Autoshutdown":"1"}}}},
                    {{"id":"{VM_ID}-b","name":"vm-2","tags":null}},
                    {{"id":"{VM_ID}-c","name":"vm-3"}}
                ]}}"#
            ))
            .create_async()
            .await;

        let subscription = Subscription {
            subscription_id: "sub-1".to_string(),
            display_name: None,
        };
        let vms = client(&server)
            .list_virtual_machines(&subscription)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(vms.len(), 3);
        assert!(vms[0].autoshutdown_eligible());
        assert!(vms[1].tags.is_empty());
        assert!(vms[2].tags.is_empty());
    }

    #[tokio::test]
    async fn test_instance_status_returns_codes() {
        let mut server = mockito::Server::new_async().await;
        let path = format!("{VM_ID}/instanceView");
        let mock = server
            .mock("GET", path.as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"statuses":[
                    {"code":"ProvisioningState/succeeded"},
                    {"code":"PowerState/running"},
                    {"code":null}
                ]}"#,
            )
            .create_async()
            .await;

        let codes = client(&server).instance_status(VM_ID).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            codes,
            vec![
                "ProvisioningState/succeeded".to_string(),
                "PowerState/running".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_deallocate_accepts_202() {
        let mut server = mockito::Server::new_async().await;
        let path = format!("{VM_ID}/deallocate");
        let mock = server
            .mock("POST", path.as_str())
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;

        client(&server).deallocate(VM_ID).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_power_off_error_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let path = format!("{VM_ID}/powerOff");
        let mock = server
            .mock("POST", path.as_str())
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body("operation in progress")
            .create_async()
            .await;

        let error = client(&server).power_off(VM_ID).await.unwrap_err();

        mock.assert_async().await;
        match error {
            CloudError::Api {
                operation, status, ..
            } => {
                assert_eq!(operation, "powerOff");
                assert_eq!(status, 409);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
