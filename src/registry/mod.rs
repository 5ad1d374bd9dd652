/// In-memory group registry.
/// Owns the table of two-member groups and performs matchmaking and teardown.
/// Every operation runs under a single lock so that scan-and-claim in
/// `find_open_group` and the creator/partner lookup in `disconnect` are atomic
/// with respect to each other.
pub mod models;

use models::{
    group_key, AttachResult, ConnectionId, Departure, DetachResult, Group, GroupSnapshot,
    MatchResult, Partner,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Group table in insertion order; auto-match picks the first open group.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: Mutex<Vec<Group>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        GroupRegistry::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Group>> {
        // Mutations never panic halfway, so a poisoned table is still consistent.
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the group if no group with this name (case-insensitive) exists.
    /// Joining an existing group is idempotent: the creator stays the first caller.
    pub fn create_or_attach(&self, group_name: &str, connection: &ConnectionId) -> AttachResult {
        let key = group_key(group_name);
        let mut groups = self.lock();

        if let Some(existing) = groups.iter().find(|g| g.key == key) {
            return AttachResult {
                group_name: existing.name.clone(),
                created: false,
            };
        }

        groups.push(Group::new(group_name, connection.clone()));
        log::info!("Group created: {} (creator {})", group_name, connection);

        AttachResult {
            group_name: group_name.to_string(),
            created: true,
        }
    }

    /// Claim the partner slot of the first open group not created by the caller.
    pub fn find_open_group(&self, connection: &ConnectionId, display_name: &str) -> MatchResult {
        let mut groups = self.lock();

        if let Some(held) = groups.iter().find(|g| g.is_partner(connection)) {
            return MatchResult::AlreadyPaired(held.name.clone());
        }

        let Some(group) = groups
            .iter_mut()
            .find(|g| g.is_open() && &g.creator != connection)
        else {
            return MatchResult::NoOpenGroup;
        };

        group.partner = Some(Partner {
            connection: connection.clone(),
            display_name: display_name.to_string(),
        });
        log::info!("Matched {} into group {}", connection, group.name);

        MatchResult::Matched(group.name.clone())
    }

    /// Retire every trace of a connection.
    ///
    /// Groups it created are removed together with their partner; a partner
    /// slot it held is cleared so the group is open again. Unknown
    /// connections (including a repeated disconnect) yield an empty result.
    pub fn disconnect(&self, connection: &ConnectionId) -> DetachResult {
        let mut groups = self.lock();
        let mut departures = Vec::new();

        for group in groups.iter_mut().filter(|g| g.is_partner(connection)) {
            let partner = group.partner.take();
            departures.push(Departure {
                group_name: group.name.clone(),
                removed_group: false,
                released_partner: None,
                display_name: partner.map(|p| p.display_name),
            });
            log::info!("Partner {} left group {}; group is open", connection, group.name);
        }

        let mut kept = Vec::with_capacity(groups.len());
        for group in groups.drain(..) {
            if &group.creator == connection {
                log::info!("Group removed: {} (creator {} left)", group.name, connection);
                departures.push(Departure {
                    group_name: group.name,
                    removed_group: true,
                    released_partner: group.partner,
                    display_name: None,
                });
            } else {
                kept.push(group);
            }
        }
        *groups = kept;

        DetachResult { departures }
    }

    pub fn get(&self, group_name: &str) -> Option<GroupSnapshot> {
        let key = group_key(group_name);
        self.lock()
            .iter()
            .find(|g| g.key == key)
            .map(GroupSnapshot::from)
    }

    /// Copy of the table in insertion order
    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        self.lock().iter().map(GroupSnapshot::from).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
