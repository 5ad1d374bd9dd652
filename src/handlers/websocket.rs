/// WebSocket transport for real-time matchmaking and relay.
/// Manages client connections, group broadcast sets, and per-connection sessions.

use crate::error::ProtocolError;
use crate::protocol::{ClientRequest, ServerEvent};
use crate::registry::models::{group_key, ConnectionId};
use crate::router::{SessionRouter, Transport};
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

/// Router wired to the WebSocket transport
pub type Router = SessionRouter<WsServer>;

/// WebSocket server state - manages client connections and broadcast sets
#[derive(Default)]
pub struct WsServer {
    pub clients: Arc<RwLock<HashMap<ConnectionId, UnboundedSender<String>>>>,
    /// Broadcast sets keyed by [`group_key`]
    pub groups: Arc<RwLock<HashMap<String, HashSet<ConnectionId>>>>,
}

impl WsServer {
    pub fn new() -> Self {
        WsServer::default()
    }

    /// Register a client connection
    pub async fn register(&self, connection: ConnectionId, tx: UnboundedSender<String>) {
        let mut clients = self.clients.write().await;
        clients.insert(connection, tx);
    }

    /// Unregister a client connection
    pub async fn unregister(&self, connection: &ConnectionId) {
        self.clients.write().await.remove(connection);

        // Remove from all broadcast sets; never hold both tables at once
        let mut groups = self.groups.write().await;
        for members in groups.values_mut() {
            members.remove(connection);
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// Add a client to a group's broadcast set
    pub async fn subscribe(&self, connection: ConnectionId, group: &str) {
        let mut groups = self.groups.write().await;
        groups
            .entry(group_key(group))
            .or_insert_with(HashSet::new)
            .insert(connection);
    }

    /// Remove a client from a group's broadcast set
    pub async fn unsubscribe(&self, connection: &ConnectionId, group: &str) {
        let key = group_key(group);
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(&key) {
            members.remove(connection);
            if members.is_empty() {
                groups.remove(&key);
            }
        }
    }

    pub async fn is_subscribed(&self, connection: &ConnectionId, group: &str) -> bool {
        let groups = self.groups.read().await;
        groups
            .get(&group_key(group))
            .is_some_and(|members| members.contains(connection))
    }

    /// Send a message to a single client
    pub async fn send_to_client(&self, connection: &ConnectionId, message: &str) {
        let clients = self.clients.read().await;
        if let Some(tx) = clients.get(connection) {
            if tx.send(message.to_string()).is_err() {
                log::debug!("Dropped message to closed connection {}", connection);
            }
        }
    }

    /// Broadcast message to all clients in a group
    pub async fn broadcast_to_group(&self, group: &str, message: &str) {
        let members: Vec<ConnectionId> = match self.groups.read().await.get(&group_key(group)) {
            Some(members) => members.iter().cloned().collect(),
            None => return,
        };
        log::debug!("Broadcast to {} ({} members)", group, members.len());

        let clients = self.clients.read().await;
        for member in &members {
            if let Some(tx) = clients.get(member) {
                if tx.send(message.to_string()).is_err() {
                    log::debug!("Dropped broadcast to closed connection {}", member);
                }
            }
        }
    }
}

impl Transport for WsServer {
    async fn send_to(&self, connection: &ConnectionId, event: ServerEvent) {
        self.send_to_client(connection, &event.to_json()).await;
    }

    async fn broadcast_to(&self, group: &str, event: ServerEvent) {
        self.broadcast_to_group(group, &event.to_json()).await;
    }

    async fn add_to_group(&self, connection: &ConnectionId, group: &str) {
        self.subscribe(connection.clone(), group).await;
    }

    async fn remove_from_group(&self, connection: &ConnectionId, group: &str) {
        self.unsubscribe(connection, group).await;
    }

    async fn is_member(&self, connection: &ConnectionId, group: &str) -> bool {
        self.is_subscribed(connection, group).await
    }
}

/// WebSocket actor for individual client connections
pub struct WsActor {
    pub connection: ConnectionId,
    /// Last display name this client supplied
    pub display_name: Option<String>,
    pub router: web::Data<Router>,
}

impl WsActor {
    fn reject(&self, ctx: &mut ws::WebsocketContext<Self>, err: ProtocolError) {
        log::warn!("Bad frame from {}: {}", self.connection, err);
        ctx.text(ServerEvent::error(err.to_string()).to_json());
    }
}

impl Actor for WsActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::debug!("WebSocket connection started: {}", self.connection);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let addr = ctx.address();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                addr.do_send(IncomingMessage(msg));
            }
        });

        // Requests wait until the connection can receive replies
        let router = self.router.clone();
        let connection = self.connection.clone();
        ctx.wait(
            async move {
                router.transport().register(connection.clone(), tx).await;
                router.on_connected(&connection);
            }
            .into_actor(self),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::debug!("WebSocket connection stopped: {}", self.connection);
        let router = self.router.clone();
        let connection = self.connection.clone();
        let display_name = self.display_name.clone();
        let fut = async move {
            router
                .on_disconnected(&connection, display_name.as_deref())
                .await;
            router.transport().unregister(&connection).await;
        };
        let _ = actix::spawn(fut);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match ClientRequest::parse(&text) {
                Ok(request) => {
                    self.display_name = Some(request.display_name().to_string());
                    let router = self.router.clone();
                    let connection = self.connection.clone();
                    // Block the mailbox so this connection's requests stay in order
                    ctx.wait(
                        async move {
                            router.handle(&connection, request).await;
                        }
                        .into_actor(self),
                    );
                }
                Err(e) => self.reject(ctx, e),
            },
            Ok(ws::Message::Binary(_)) => {
                self.reject(ctx, ProtocolError::UnsupportedFrame("binary"));
            }
            Ok(ws::Message::Ping(payload)) => {
                ctx.pong(&payload);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::error!("WebSocket error on {}: {}", self.connection, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct IncomingMessage(String);

impl Handler<IncomingMessage> for WsActor {
    type Result = ();

    fn handle(&mut self, msg: IncomingMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// WebSocket connection handler
/// GET /ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    router: web::Data<Router>,
) -> actix_web::Result<HttpResponse> {
    let actor = WsActor {
        connection: ConnectionId::generate(),
        display_name: None,
        router,
    };

    ws::start(actor, &req, stream)
}
