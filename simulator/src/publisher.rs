use crate::sample::Sample;
use reqwest::StatusCode;
use rumqttc::{AsyncClient, ClientError, QoS};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    /// Timeouts, refused connections and 5xx. Worth backing off for.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Transient(e.to_string())
    }
}

impl From<ClientError> for PublishError {
    fn from(e: ClientError) -> Self {
        PublishError::Transient(e.to_string())
    }
}

pub enum Publisher {
    Http {
        client: reqwest::Client,
        url: String,
    },
    Mqtt {
        client: AsyncClient,
    },
}

impl Publisher {
    pub fn http(url: String, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Publisher::Http { client, url })
    }

    pub fn mqtt(client: AsyncClient) -> Self {
        Publisher::Mqtt { client }
    }

    pub async fn publish(&self, sample: &Sample) -> Result<(), PublishError> {
        match self {
            Publisher::Http { client, url } => {
                let response = client.post(url).json(sample).send().await?;
                let status = response.status();
                if status == StatusCode::CREATED {
                    return Ok(());
                }
                let body = response.text().await.unwrap_or_default();
                Err(outcome_for(status, body))
            }
            Publisher::Mqtt { client } => {
                let payload = serde_json::to_vec(sample).map_err(|e| PublishError::Rejected {
                    status: 0,
                    body: e.to_string(),
                })?;
                client
                    .publish(topic_for(sample.device), QoS::AtLeastOnce, false, payload)
                    .await?;
                Ok(())
            }
        }
    }
}

fn outcome_for(status: StatusCode, body: String) -> PublishError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        PublishError::Transient(format!("{}: {}", status, body))
    } else {
        PublishError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

pub fn topic_for(device: i64) -> String {
    format!("sensors/{}/readings", device)
}
