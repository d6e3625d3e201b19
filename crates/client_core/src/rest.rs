use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use shared::{
    domain::ChannelScope,
    error::{ApiError, ApiException},
    protocol::{ChannelSummary, MessagePage},
};

/// REST client for paginated channel history and channel metadata. Owns no
/// business logic; payloads are validated into typed values at this boundary.
#[derive(Debug, Clone)]
pub struct HistoryApi {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_messages(
        &self,
        scope: &ChannelScope,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage> {
        let url = format!(
            "{}/servers/{}/channels/{}/messages",
            self.base_url, scope.server_id, scope.channel_id
        );
        let response = self
            .http
            .get(url)
            .query(&[
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
            ])
            .send()
            .await
            .context("messages request failed")?;

        let body = decode_body(response).await?;
        MessagePage::from_wire(body).context("malformed messages response")
    }

    pub async fn fetch_channel(&self, scope: &ChannelScope) -> Result<ChannelSummary> {
        let url = format!(
            "{}/servers/{}/channels/{}",
            self.base_url, scope.server_id, scope.channel_id
        );
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("channel request failed")?;

        let body = decode_body(response).await?;
        serde_json::from_value(body).context("malformed channel response")
    }
}

/// Non-2xx responses are surfaced as the API's structured error when the
/// body carries one, otherwise as a plain status failure.
async fn decode_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        if let Ok(api_error) = response.json::<ApiError>().await {
            return Err(ApiException::from(api_error).into());
        }
        return Err(anyhow!("request failed with status {status}"));
    }

    response.json().await.context("invalid response body")
}
