//! Conversation history API: list and delete.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::{BackendConfig, TransportError};

use crate::http::{join_url, map_reqwest_error};

/// One entry of `GET /conversations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl ConversationSummary {
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[derive(Clone)]
pub struct ConversationsClient {
    client: Client,
    base_url: String,
}

impl ConversationsClient {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: join_url(&config.base_url, "conversations"),
        })
    }

    pub async fn list(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        debug!("Listing conversations from {}", self.base_url);
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<ConversationSummary>>()
            .await
            .map_err(|e| TransportError::Other(format!("Invalid conversation list: {}", e)))
    }

    pub async fn delete(&self, id: &str) -> Result<(), TransportError> {
        let url = join_url(&self.base_url, id);
        debug!("Deleting conversation {}", id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
