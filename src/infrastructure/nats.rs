// Copyright 2025 Cowboy AI, LLC.

//! NATS transport for the message substrate
//!
//! Logical topics are mapped to subjects through [`Topics`]. The record key
//! and the tenant travel as message headers; the payload is the serialized
//! envelope.

use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{DomainError, DomainResult};
use crate::message::{ConsumerManager, Message, Publisher, Topics};
use crate::tenant::{MAJOR_VERSION_HEADER, MINOR_VERSION_HEADER, REGION_HEADER, TENANT_ID_HEADER};

/// Header carrying the partition key
pub const KEY_HEADER: &str = "KEY";

const CARRIED_HEADERS: [&str; 4] = [
    TENANT_ID_HEADER,
    REGION_HEADER,
    MAJOR_VERSION_HEADER,
    MINOR_VERSION_HEADER,
];

/// Errors that can occur when working with NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Publish was not accepted
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Subscription could not be created
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
}

impl From<NatsError> for DomainError {
    fn from(err: NatsError) -> Self {
        DomainError::TransientBus(err.to_string())
    }
}

/// Configuration for the NATS connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Client name reported to the server
    pub client_name: String,

    /// Queue group shared by every replica of this service
    pub consumer_group: String,

    /// Optional username for authentication
    pub user: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "realm-server".to_string(),
            consumer_group: "realm-server".to_string(),
            user: None,
            password: None,
            connection_timeout_secs: 10,
        }
    }
}

/// Connect with `config`
pub async fn connect(config: &NatsConfig) -> Result<Client, NatsError> {
    let mut options = ConnectOptions::new()
        .name(config.client_name.clone())
        .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Disconnected => warn!("NATS disconnected"),
                async_nats::Event::Connected => info!("NATS connected"),
                async_nats::Event::ClientError(err) => error!(error = %err, "NATS client error"),
                other => debug!(event = ?other, "NATS event"),
            }
        });

    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options = options.user_and_password(user.clone(), password.clone());
    }

    options
        .connect(&config.url)
        .await
        .map_err(|e| {
            NatsError::ConnectionFailed(format!("Failed to connect to {}: {}", config.url, e))
        })
}

fn to_headers(message: &Message) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &message.headers {
        headers.insert(name.as_str(), value.as_str());
    }
    headers.insert(KEY_HEADER, message.key.as_str());
    headers
}

fn from_nats(message: async_nats::Message) -> Message {
    let lookup = |name: &str| {
        message
            .headers
            .as_ref()
            .and_then(|h| h.get(name))
            .map(|v| v.as_str().to_string())
    };
    Message {
        key: lookup(KEY_HEADER).unwrap_or_default(),
        headers: CARRIED_HEADERS
            .into_iter()
            .filter_map(|name| lookup(name).map(|v| (name.to_string(), v)))
            .collect(),
        payload: message.payload.clone(),
    }
}

/// [`Publisher`] sending to NATS subjects
#[derive(Clone)]
pub struct NatsPublisher {
    client: Client,
    topics: Arc<Topics>,
}

impl NatsPublisher {
    /// Publisher over `client`, resolving subjects through `topics`
    pub fn new(client: Client, topics: Arc<Topics>) -> Self {
        Self { client, topics }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, topic: &str, messages: Vec<Message>) -> DomainResult<()> {
        let subject = self.topics.subject(topic);
        for message in messages {
            self.client
                .publish_with_headers(subject.clone(), to_headers(&message), message.payload)
                .await
                .map_err(|e| NatsError::PublishFailed(format!("{subject}: {e}")))?;
        }
        self.client
            .flush()
            .await
            .map_err(|e| NatsError::PublishFailed(format!("{subject}: {e}")))?;
        Ok(())
    }
}

/// Subscribe every topic registered with `manager` and feed it
///
/// One queue subscription is made per topic under `group`. Each task runs
/// until `shutdown` flips to `true`.
pub async fn spawn_consumers(
    client: Client,
    topics: Arc<Topics>,
    group: String,
    manager: ConsumerManager,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, NatsError> {
    let mut handles = Vec::new();
    for logical in manager.topics() {
        let subject = topics.subject(&logical);
        let mut subscriber = client
            .queue_subscribe(subject.clone(), group.clone())
            .await
            .map_err(|e| NatsError::SubscribeFailed(format!("{subject}: {e}")))?;
        info!(topic = %logical, subject = %subject, group = %group, "Consumer started");

        let manager = manager.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    next = subscriber.next() => {
                        let Some(message) = next else {
                            warn!(topic = %logical, "Subscription closed");
                            break;
                        };
                        if let Err(err) = manager.dispatch(&logical, &from_nats(message)).await {
                            warn!(
                                topic = %logical,
                                category = %err.category(),
                                error = %err,
                                "Dropping undeliverable record"
                            );
                        }
                    }
                }
            }
            if let Err(err) = subscriber.unsubscribe().await {
                debug!(topic = %logical, error = %err, "Unsubscribe failed");
            }
            info!(topic = %logical, "Consumer stopped");
        }));
    }
    Ok(handles)
}
