/// In-process loopback cache service.
///
/// The real cache service is reached through a client library that lives outside
/// this crate.  The loopback honours the same contract (duplicate adds fail,
/// update/remove of a missing key fail, ttl expiry, eviction and per-client event
/// subscriptions) so the exercise runs have something to drive in tests and when no
/// remote service is configured.
///
pub mod handler;
pub mod status;

use crate::client::{CacheClient, CacheHandle, Connector};
use crate::config::{ConnectionOptions, ServerConfig};
use crate::error::CacheError;
use anyhow::Result;
use async_channel::{bounded, Sender};
use async_std::task;
use async_trait::async_trait;
use domain_keys::keys::RouteKey;
use handler::Command;
use log::*;
use service_uptime::Uptime;
use status::{JsonString, ServerStatus, DOWN};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheServer {
    id: String,
    config: ServerConfig,
    uptime: Uptime,
    request_tx: Sender<Command>,
}

impl CacheServer {
    /// create and start the service loop and its expiry sweeper.
    pub async fn start(config: ServerConfig) -> CacheServer {
        let uptime = Uptime::new();
        let id = RouteKey::create();

        // this is for the server struct
        let sid = id.clone();

        info!(
            "starting cache service, id: {}, endpoint: {}:{}",
            id, config.host, config.port
        );

        let (request_tx, request_receiver) = bounded(250);

        // run the handler loop as a background task
        let max_entries = config.max_entries;
        task::spawn(async move {
            match handler::handler(id.clone(), max_entries, request_receiver).await {
                Ok(()) => info!("handler exit for server id: {}", id),
                Err(e) => error!("server exit with error: {:?}", e),
            }
        });

        // the sweeper stops once the handler closes the request channel
        let sweep_tx = request_tx.clone();
        let interval = Duration::from_millis(config.sweep_interval_ms.max(10));
        task::spawn(async move {
            loop {
                task::sleep(interval).await;
                if sweep_tx.send(Command::Sweep).await.is_err() {
                    break;
                }
            }
        });

        CacheServer {
            id: sid,
            config,
            uptime,
            request_tx,
        }
    }

    /// return the server's id
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// return the uptime as days, hh:mm:ss
    pub fn get_uptime(&self) -> String {
        self.uptime.to_string()
    }

    pub fn is_running(&self) -> bool {
        !self.request_tx.is_closed()
    }

    /// open a client connection; the options must name this service's endpoint
    pub async fn open(&self, options: &ConnectionOptions) -> Result<CacheClient, CacheError> {
        if options.host != self.config.host || options.port != self.config.port {
            return Err(CacheError::Connection(format!(
                "no cache service at {}",
                options.endpoint()
            )));
        }

        CacheClient::open(self.request_tx.clone(), options).await
    }

    /// the service status as a json string
    pub async fn status(&self) -> JsonString {
        let (tx, rx) = bounded(1);
        if self.request_tx.send(Command::Status(tx)).await.is_ok() {
            if let Ok(js) = rx.recv().await {
                return js;
            }
        }

        ServerStatus {
            server_id: self.id(),
            status: DOWN.to_string(),
            state: status::ServerState::Shutdown,
            uptime: self.get_uptime(),
            entries: 0,
            clients: 0,
            error_count: 0,
        }
        .to_json()
    }

    /// number of live entries, zero when the service is down
    pub async fn len(&self) -> usize {
        let (tx, rx) = bounded(1);
        if self.request_tx.send(Command::Len(tx)).await.is_err() {
            return 0;
        }
        rx.recv().await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request_tx.send(Command::Shutdown).await?;
        info!("cache service {} shutdown requested", self.id);
        Ok(())
    }
}

#[async_trait]
impl Connector for CacheServer {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Arc<dyn CacheHandle>, CacheError> {
        let client = self.open(options).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::interactive::{self, Instruction};
    use status::{ServerState, OK};

    fn options() -> ConnectionOptions {
        ConnectionOptions::new("localhost", 5050, 1000)
    }

    #[test]
    fn start_and_status() {
        task::block_on(async move {
            let server = CacheServer::start(ServerConfig::default()).await;
            assert_eq!(server.id().len(), 16);
            assert_eq!(server.endpoint(), "localhost:5050");
            assert!(server.is_running());

            let status = ServerStatus::from_json(&server.status().await).expect("status json");
            assert_eq!(status.status, OK);
            assert_eq!(status.state, ServerState::Idle);
            assert_eq!(status.entries, 0);

            assert!(server.shutdown().await.is_ok());
        });
    }

    #[test]
    fn set_get_remove() {
        task::block_on(async move {
            let server = CacheServer::start(ServerConfig::default()).await;
            let client = server.open(&options()).await.expect("should connect");
            assert!(client.is_connected());
            assert!(server.is_empty().await);

            // now set the first value
            let key = "my-key";
            let value = "my value";
            assert!(client.add(key, value, None).await.is_ok());
            assert_eq!(server.len().await, 1);
            assert_eq!(client.get(key).await, Ok(Some(value.to_string())));

            assert_eq!(
                client.add(key, value, None).await,
                Err(CacheError::DuplicateKey(key.to_string()))
            );

            assert!(client.update(key, "changed").await.is_ok());
            assert_eq!(client.get(key).await, Ok(Some("changed".to_string())));

            // remove the value by key
            assert!(client.remove(key).await.is_ok());
            assert_eq!(client.get(key).await, Ok(None));
            assert_eq!(
                client.remove(key).await,
                Err(CacheError::NotFound(key.to_string()))
            );
            assert_eq!(server.len().await, 0);

            let status = ServerStatus::from_json(&server.status().await).expect("status json");
            assert_eq!(status.clients, 1);
            assert_eq!(status.state, ServerState::Busy);

            assert!(client.close().await.is_ok());
            assert!(server.shutdown().await.is_ok());
        });
    }

    #[test]
    fn huge_ttl_keeps_service_running() {
        task::block_on(async move {
            let server = CacheServer::start(ServerConfig::default()).await;
            let client = server.open(&options()).await.expect("should connect");

            let line = format!("addex far {} v", u64::MAX);
            let instruction = line.parse::<Instruction>().expect("valid command");
            assert!(matches!(
                interactive::execute(&client, &instruction).await,
                Err(CacheError::Fault(_))
            ));

            assert!(server.is_running());
            assert!(client.add("near", "v", None).await.is_ok());
            assert_eq!(client.get("far").await, Ok(None));
            assert_eq!(server.len().await, 1);

            let status = ServerStatus::from_json(&server.status().await).expect("status json");
            assert_eq!(status.status, OK);
            assert!(server.shutdown().await.is_ok());
        });
    }

    #[test]
    fn connect_failures() {
        task::block_on(async move {
            let server = CacheServer::start(ServerConfig::default()).await;

            let wrong_port = ConnectionOptions::new("localhost", 6000, 1000);
            assert!(matches!(
                server.open(&wrong_port).await,
                Err(CacheError::Connection(_))
            ));

            let no_timeout = ConnectionOptions::new("localhost", 5050, 0);
            assert!(matches!(
                server.open(&no_timeout).await,
                Err(CacheError::Connection(_))
            ));

            assert!(server.shutdown().await.is_ok());
            task::sleep(Duration::from_millis(50)).await;
            assert!(!server.is_running());
            assert!(matches!(
                server.open(&options()).await,
                Err(CacheError::Connection(_))
            ));
        });
    }

    #[test]
    fn closed_client_and_stopped_server() {
        task::block_on(async move {
            let server = CacheServer::start(ServerConfig::default()).await;
            let client = server.open(&options()).await.expect("should connect");

            assert!(client.close().await.is_ok());
            assert!(client.close().await.is_ok());
            assert!(!client.is_connected());
            assert!(matches!(
                client.get("k").await,
                Err(CacheError::Connection(_))
            ));

            let other = server.open(&options()).await.expect("should connect");
            assert!(server.shutdown().await.is_ok());
            task::sleep(Duration::from_millis(50)).await;
            assert!(matches!(
                other.subscribe(&[EventKind::Added]).await,
                Err(CacheError::Connection(_))
            ));
            assert!(other.close().await.is_ok());
        });
    }
}
