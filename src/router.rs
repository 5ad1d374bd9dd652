/// Session routing between the transport and the group registry.
/// Turns connection lifecycle events and client requests into registry
/// operations, then emits direct replies and group broadcasts.
use crate::protocol::{ClientRequest, ServerEvent};
use crate::registry::models::{ConnectionId, MatchResult};
use crate::registry::GroupRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outbound side of the transport layer.
///
/// Broadcast sets are keyed by group name, compared case-insensitively.
pub trait Transport: Send + Sync {
    fn send_to(&self, connection: &ConnectionId, event: ServerEvent)
        -> impl Future<Output = ()> + Send;

    fn broadcast_to(&self, group: &str, event: ServerEvent) -> impl Future<Output = ()> + Send;

    fn add_to_group(&self, connection: &ConnectionId, group: &str)
        -> impl Future<Output = ()> + Send;

    fn remove_from_group(
        &self,
        connection: &ConnectionId,
        group: &str,
    ) -> impl Future<Output = ()> + Send;

    fn is_member(&self, connection: &ConnectionId, group: &str)
        -> impl Future<Output = bool> + Send;
}

/// Who may post to a group's broadcast set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPolicy {
    /// Any connection that knows a group name may post to it
    #[default]
    Open,
    /// Only connections in the group's broadcast set may post
    MembersOnly,
}

pub struct SessionRouter<T> {
    registry: GroupRegistry,
    transport: Arc<T>,
    policy: SendPolicy,
    /// Held across a registry change and the broadcast-set update that
    /// mirrors it, so the two never interleave with another connection's.
    /// Sends happen after it is released.
    membership: Mutex<()>,
}

impl<T: Transport> SessionRouter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        SessionRouter {
            registry: GroupRegistry::new(),
            transport,
            policy: SendPolicy::default(),
            membership: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn policy(&self) -> SendPolicy {
        self.policy
    }

    pub fn on_connected(&self, connection: &ConnectionId) {
        log::info!("Client connected: {}", connection);
    }

    /// Tear down the connection's groups and tell the remaining members.
    ///
    /// `display_name` is the last name the session saw from this connection.
    pub async fn on_disconnected(&self, connection: &ConnectionId, display_name: Option<&str>) {
        let detached = {
            let _membership = self.membership.lock().await;
            let detached = self.registry.disconnect(connection);
            for departure in &detached.departures {
                self.transport
                    .remove_from_group(connection, &departure.group_name)
                    .await;
                if let Some(partner) = &departure.released_partner {
                    self.transport
                        .remove_from_group(&partner.connection, &departure.group_name)
                        .await;
                }
            }
            detached
        };

        for departure in &detached.departures {
            let name = display_name
                .or(departure.display_name.as_deref())
                .unwrap_or_default();

            self.transport
                .broadcast_to(&departure.group_name, ServerEvent::left(name))
                .await;
            // The released partner is already out of the broadcast set
            if let Some(partner) = &departure.released_partner {
                self.transport
                    .send_to(&partner.connection, ServerEvent::left(name))
                    .await;
            }
        }

        log::info!("Client disconnected: {}", connection);
    }

    pub async fn on_join(&self, connection: &ConnectionId, display_name: &str, group: &str) {
        let attached = {
            let _membership = self.membership.lock().await;
            let attached = self.registry.create_or_attach(group, connection);
            self.transport
                .add_to_group(connection, &attached.group_name)
                .await;
            attached
        };

        self.transport
            .broadcast_to(&attached.group_name, ServerEvent::joined(display_name))
            .await;
    }

    pub async fn on_find_group(&self, connection: &ConnectionId, display_name: &str) {
        let matched = {
            let _membership = self.membership.lock().await;
            let matched = self.registry.find_open_group(connection, display_name);
            if let MatchResult::Matched(group) = &matched {
                self.transport.add_to_group(connection, group).await;
            }
            matched
        };

        if let MatchResult::Matched(group) = &matched {
            self.transport
                .broadcast_to(group, ServerEvent::joined(display_name))
                .await;
        }

        self.transport
            .send_to(connection, ServerEvent::found_group(matched.group_name()))
            .await;
    }

    pub async fn on_send(
        &self,
        connection: &ConnectionId,
        display_name: &str,
        message: &str,
        group: &str,
    ) {
        if self.policy == SendPolicy::MembersOnly
            && !self.transport.is_member(connection, group).await
        {
            log::warn!("Rejected send from {} to non-member group {}", connection, group);
            self.transport
                .send_to(
                    connection,
                    ServerEvent::error(format!("Not a member of group {}", group)),
                )
                .await;
            return;
        }

        self.transport
            .broadcast_to(group, ServerEvent::message(display_name, message))
            .await;
    }

    /// Dispatch a parsed client request
    pub async fn handle(&self, connection: &ConnectionId, request: ClientRequest) {
        match request {
            ClientRequest::Join { name, group } => self.on_join(connection, &name, &group).await,
            ClientRequest::FindGroup { name } => self.on_find_group(connection, &name).await,
            ClientRequest::Send {
                name,
                message,
                group,
            } => self.on_send(connection, &name, &message, &group).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::group_key;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Transport that records what every connection would receive
    #[derive(Default)]
    struct RecordingTransport {
        groups: Mutex<HashMap<String, Vec<ConnectionId>>>,
        delivered: Mutex<Vec<(ConnectionId, ServerEvent)>>,
        broadcasts: Mutex<usize>,
    }

    impl RecordingTransport {
        fn received(&self, connection: &str) -> Vec<ServerEvent> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c.as_str() == connection)
                .map(|(_, e)| e.clone())
                .collect()
        }

        fn members(&self, group: &str) -> HashSet<ConnectionId> {
            self.groups
                .lock()
                .unwrap()
                .get(&group_key(group))
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default()
        }

        fn broadcast_count(&self) -> usize {
            *self.broadcasts.lock().unwrap()
        }
    }

    impl Transport for RecordingTransport {
        async fn send_to(&self, connection: &ConnectionId, event: ServerEvent) {
            self.delivered
                .lock()
                .unwrap()
                .push((connection.clone(), event));
        }

        async fn broadcast_to(&self, group: &str, event: ServerEvent) {
            *self.broadcasts.lock().unwrap() += 1;
            let members = self
                .groups
                .lock()
                .unwrap()
                .get(&group_key(group))
                .cloned()
                .unwrap_or_default();
            let mut delivered = self.delivered.lock().unwrap();
            for member in members {
                delivered.push((member, event.clone()));
            }
        }

        async fn add_to_group(&self, connection: &ConnectionId, group: &str) {
            tokio::task::yield_now().await;
            let mut groups = self.groups.lock().unwrap();
            let members = groups.entry(group_key(group)).or_default();
            if !members.contains(connection) {
                members.push(connection.clone());
            }
        }

        async fn remove_from_group(&self, connection: &ConnectionId, group: &str) {
            if let Some(members) = self.groups.lock().unwrap().get_mut(&group_key(group)) {
                members.retain(|m| m != connection);
            }
        }

        async fn is_member(&self, connection: &ConnectionId, group: &str) -> bool {
            self.members(group).contains(connection)
        }
    }

    fn router() -> SessionRouter<RecordingTransport> {
        SessionRouter::new(Arc::new(RecordingTransport::default()))
    }

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    /// X creates room1 and Y is auto-matched into it
    async fn paired_router() -> SessionRouter<RecordingTransport> {
        let router = router();
        router.on_join(&id("x"), "X", "room1").await;
        router.on_find_group(&id("y"), "Y").await;
        router
    }

    #[tokio::test]
    async fn test_join_creates_group_and_broadcasts() {
        let router = router();
        router.on_join(&id("x"), "X", "room1").await;

        let group = router.registry().get("room1").unwrap();
        assert_eq!(group.creator, id("x"));
        assert!(group.open);
        assert_eq!(router.transport().received("x"), vec![ServerEvent::joined("X")]);
    }

    #[tokio::test]
    async fn test_find_group_pairs_and_notifies_both() {
        let router = paired_router().await;

        let group = router.registry().get("room1").unwrap();
        assert!(!group.open);
        assert_eq!(group.partner, Some(id("y")));

        let transport = router.transport();
        assert_eq!(
            transport.received("y"),
            vec![
                ServerEvent::joined("Y"),
                ServerEvent::found_group(Some("room1"))
            ]
        );
        assert_eq!(
            transport.received("x"),
            vec![ServerEvent::joined("X"), ServerEvent::joined("Y")]
        );
    }

    #[tokio::test]
    async fn test_partner_disconnect_reopens_group() {
        let router = paired_router().await;

        router.on_disconnected(&id("y"), Some("Y")).await;

        let group = router.registry().get("room1").unwrap();
        assert!(group.open);
        assert!(group.partner.is_none());
        assert_eq!(group.creator, id("x"));
        assert_eq!(
            router.transport().received("x").last(),
            Some(&ServerEvent::left("Y"))
        );
        assert!(!router.transport().members("room1").contains(&id("y")));
    }

    #[tokio::test]
    async fn test_partner_disconnect_falls_back_to_matched_name() {
        let router = paired_router().await;

        router.on_disconnected(&id("y"), None).await;

        assert_eq!(
            router.transport().received("x").last(),
            Some(&ServerEvent::left("Y"))
        );
    }

    #[tokio::test]
    async fn test_creator_disconnect_removes_group() {
        let router = paired_router().await;

        router.on_disconnected(&id("x"), Some("X")).await;

        assert!(router.registry().get("room1").is_none());
        assert_eq!(
            router.transport().received("y").last(),
            Some(&ServerEvent::left("X"))
        );
        assert!(router.transport().members("room1").is_empty());

        router.on_find_group(&id("z"), "Z").await;
        assert_eq!(
            router.transport().received("z"),
            vec![ServerEvent::found_group(None)]
        );
    }

    #[tokio::test]
    async fn test_find_group_with_no_groups() {
        let router = router();

        router.on_find_group(&id("z"), "Z").await;

        assert_eq!(
            router.transport().received("z"),
            vec![ServerEvent::found_group(None)]
        );
        assert_eq!(router.transport().broadcast_count(), 0);
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_disconnect_is_silent() {
        let router = paired_router().await;

        router.on_disconnected(&id("y"), Some("Y")).await;
        let broadcasts = router.transport().broadcast_count();
        router.on_disconnected(&id("y"), Some("Y")).await;

        assert_eq!(router.transport().broadcast_count(), broadcasts);
    }

    #[tokio::test]
    async fn test_concurrent_find_group_matches_once() {
        let router = router();
        router.on_join(&id("x"), "X", "room1").await;

        let (a, b) = (id("a"), id("b"));
        tokio::join!(
            router.on_find_group(&a, "A"),
            router.on_find_group(&b, "B")
        );

        let transport = router.transport();
        let found: Vec<ServerEvent> = ["a", "b"]
            .iter()
            .filter_map(|c| {
                transport
                    .received(c)
                    .into_iter()
                    .find(|e| matches!(e, ServerEvent::FoundGroup { .. }))
            })
            .collect();
        assert_eq!(found.len(), 2);
        assert_eq!(
            found
                .iter()
                .filter(|e| **e == ServerEvent::found_group(Some("room1")))
                .count(),
            1
        );
        assert!(found.contains(&ServerEvent::found_group(None)));
    }

    #[tokio::test]
    async fn test_creator_leaving_during_match_frees_partner() {
        let router = router();
        router.on_join(&id("x"), "X", "room1").await;

        // Matching suspends inside add_to_group; the creator leaves meanwhile
        let y = id("y");
        tokio::join!(router.on_find_group(&y, "Y"), async {
            tokio::task::yield_now().await;
            router.on_disconnected(&id("x"), Some("X")).await;
        });

        let transport = router.transport();
        assert!(router.registry().get("room1").is_none());
        assert!(transport.members("room1").is_empty());
        assert_eq!(transport.received("y").last(), Some(&ServerEvent::left("X")));

        // Y is free again and a new room1 never reaches the old pairing
        router.on_join(&id("w"), "W", "room1").await;
        router.on_find_group(&id("y"), "Y").await;
        assert_eq!(
            transport.members("room1"),
            [id("w"), id("y")].into_iter().collect::<HashSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_send_reaches_group_members() {
        let router = paired_router().await;

        router.on_send(&id("x"), "X", "hello", "room1").await;

        let expected = ServerEvent::message("X", "hello");
        assert_eq!(router.transport().received("x").last(), Some(&expected));
        assert_eq!(router.transport().received("y").last(), Some(&expected));
    }

    #[tokio::test]
    async fn test_send_open_policy_allows_outsiders() {
        let router = paired_router().await;

        router.on_send(&id("outsider"), "O", "hi", "room1").await;
        router.on_send(&id("outsider"), "O", "hi", "nowhere").await;

        assert_eq!(
            router.transport().received("y").last(),
            Some(&ServerEvent::message("O", "hi"))
        );
        assert!(router.transport().received("outsider").is_empty());
    }

    #[tokio::test]
    async fn test_send_members_only_policy_rejects_outsiders() {
        let router = SessionRouter::new(Arc::new(RecordingTransport::default()))
            .with_policy(SendPolicy::MembersOnly);
        router.on_join(&id("x"), "X", "room1").await;

        router.on_send(&id("outsider"), "O", "hi", "room1").await;
        router.on_send(&id("x"), "X", "mine", "room1").await;

        let transport = router.transport();
        assert!(matches!(
            transport.received("outsider").as_slice(),
            [ServerEvent::Error { .. }]
        ));
        assert_eq!(
            transport.received("x").last(),
            Some(&ServerEvent::message("X", "mine"))
        );
        assert!(!transport
            .received("x")
            .contains(&ServerEvent::message("O", "hi")));
    }

    #[tokio::test]
    async fn test_handle_dispatches_requests() {
        let router = router();

        router
            .handle(
                &id("x"),
                ClientRequest::Join {
                    name: "X".to_string(),
                    group: "Room1".to_string(),
                },
            )
            .await;
        router
            .handle(
                &id("y"),
                ClientRequest::FindGroup {
                    name: "Y".to_string(),
                },
            )
            .await;

        assert_eq!(
            router.transport().received("y").last(),
            Some(&ServerEvent::found_group(Some("Room1")))
        );
    }
}
