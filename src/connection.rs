use std::{fmt::Display, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use futures::executor;
use futures_util::Future;
use log::{debug, error, info};
use serde::Deserialize;
use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_tungstenite::WebSocketStream;

use crate::{
    api_access::{ApiAccessManager, ApiPermissions},
    config::Config,
    messages::{dto, Message, MessageBody, MessageChannel},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_on: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_on: "127.0.0.1:8069".to_string(),
        }
    }
}

pub struct ConnectionListener {
    config: ServerConfig,
    listener: TcpListener,
}

impl ConnectionListener {
    pub async fn bind(config: Arc<Config>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.server.listen_on)
            .await
            .context("Failed to start TCP server")?;
        Ok(Self {
            listener,
            config: config.server.clone(),
        })
    }

    pub async fn listen<F: Future<Output = anyhow::Result<()>> + Send>(
        &self,
        handler: impl Fn(Connection) -> F + Send + Sync + 'static,
    ) {
        info!("Server listening on {}...", self.config.listen_on);

        let handler = Arc::new(handler);

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(val) => val,
                Err(err) => {
                    error!("TCP connection failed: {err:?}");
                    continue;
                }
            };
            let handler_ref = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(err) =
                    Self::handle_connection(addr.to_string(), stream, handler_ref).await
                {
                    error!("Error during connection with {addr}: {err:?}");
                }
            });
        }
    }

    async fn handle_connection<F: Future<Output = anyhow::Result<()>>>(
        name: String,
        stream: TcpStream,
        handler: Arc<impl Fn(Connection) -> F>,
    ) -> anyhow::Result<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .context("Failed to accept websocket connection")?;

        handler(Connection::new(name, ws)).await?;

        Ok(())
    }
}

pub struct Connection {
    open: bool,
    name: String,
    surface_name: Option<String>,
    permissions: ApiPermissions,
    channel: MessageChannel<WebSocketStream<TcpStream>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ServerError,
    Unauthorized,
    Timeout,
}

impl Connection {
    const ATTACH_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(name: String, ws: WebSocketStream<TcpStream>) -> Self {
        debug!("Creating connection {name}");
        Self {
            open: true,
            name,
            surface_name: None,
            permissions: ApiPermissions::default(),
            channel: MessageChannel::new(ws),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn surface_name(&self) -> &str {
        self.surface_name
            .as_ref()
            .map(String::as_ref)
            .unwrap_or("Not attached")
    }

    pub fn permissions(&self) -> &ApiPermissions {
        &self.permissions
    }

    pub async fn init(&mut self, access_mgr: &ApiAccessManager) -> anyhow::Result<()> {
        debug!("Waiting for attach message on connection {}...", self.name);
        'wait_for_attach: loop {
            match timeout(Self::ATTACH_TIMEOUT, self.recv()).await {
                Ok(None) => return Err(anyhow!("Connection closed before attaching")),
                Ok(Some(Message {
                    body: MessageBody::SurfaceAttachV1(body),
                    ..
                })) => {
                    self.surface_name = Some(body.name);
                    let api_key = body.api_key.as_deref();
                    self.permissions = ApiPermissions {
                        attach: access_mgr.acquire_permissions(api_key, ApiPermissions::attach()),
                        script: access_mgr.acquire_permissions(api_key, ApiPermissions::script()),
                    };
                    if !self.permissions.attach {
                        self.close(CloseReason::Unauthorized, "Unauthorized")
                            .await
                            .context("Failed to close unauthorized connection")?;
                        return Err(anyhow!("Unauthorized"));
                    } else {
                        self.send(Message::new(MessageBody::SurfaceAttachAckV1))
                            .await
                            .context("Failed to send attach ack message")?;
                        break 'wait_for_attach;
                    }
                }
                Ok(Some(Message { .. })) => self.send_error("Expected attach message").await,
                Err(timeout_err) => {
                    let err = anyhow!(timeout_err).context("Attach message not received in time!");
                    self.close(CloseReason::Timeout, &err)
                        .await
                        .context("Failed to close connection after failed attach")?;
                    return Err(err);
                }
            }
        }
        debug!(
            "Connection {} attached as surface \"{}\"",
            self.name,
            self.surface_name()
        );
        Ok(())
    }

    pub async fn send(&mut self, message: Message) -> anyhow::Result<()> {
        self.channel.send(message).await?;
        Ok(())
    }

    pub async fn send_error(&mut self, message: impl Display) {
        let _ = self
            .send(Message::new(MessageBody::SurfaceClientErrorV1(
                dto::SurfaceClientErrorMsgBodyV1 {
                    message: message.to_string(),
                },
            )))
            .await;
    }

    pub async fn recv(&mut self) -> Option<Message> {
        if !self.open {
            return None;
        }
        loop {
            let Some(msg_res) = self.channel.recv().await else {
                self.close_silent().await;
                return None;
            };
            match msg_res {
                Ok(Message {
                    body: MessageBody::SurfacePingV1,
                    ..
                }) => {
                    if let Err(err) = self.send(Message::new(MessageBody::SurfacePongV1)).await {
                        error!("Failed to send pong to surface {}: {err:?}", self.name);
                    }
                }
                Ok(Message {
                    body: MessageBody::SurfaceKeepaliveV1 | MessageBody::SurfacePongV1,
                    ..
                }) => {
                    // do nothing
                }
                Ok(msg) => return Some(msg),
                Err(err) => {
                    debug!(
                        "Received malformed message from surface {}: {err:?}",
                        self.name
                    );
                    self.send_error(err.to_string()).await;
                }
            }
        }
    }

    pub async fn close(
        &mut self,
        reason: CloseReason,
        message: impl Display,
    ) -> anyhow::Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let result = self
            .send(Message::new(MessageBody::SurfaceClosedV1(
                dto::SurfaceClosedMsgBodyV1 {
                    reason: match reason {
                        CloseReason::ServerError => dto::SurfaceClosedReasonV1::ServerError,
                        CloseReason::Unauthorized => dto::SurfaceClosedReasonV1::Unauthorized,
                        CloseReason::Timeout => dto::SurfaceClosedReasonV1::Timeout,
                    },
                    message: message.to_string(),
                },
            )))
            .await;
        self.close_silent().await;
        result
    }

    async fn close_silent(&mut self) {
        self.open = false;
        if let Err(err) = self.channel.close().await {
            error!("Failed to close websocket {}: {err:?}", self.name);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        let close_future = self.close(CloseReason::ServerError, "Connection terminated");
        if let Err(err) = executor::block_on(close_future) {
            error!("Failed to close connection {} in drop: {err:?}", self.name)
        }
    }
}
