//! Connection registry: connections grouped by account id plus a global
//! observer set, with best-effort fan-out.
//!
//! Structural changes go through one mutex. Sends never run under it: a
//! broadcast snapshots its recipients, releases the lock, sends to all of
//! them concurrently, and only then takes the lock again to drop the
//! connections whose send failed.

use std::collections::HashMap;
use std::sync::Arc;

use chatpush_core::{to_wire_string, AccountId, ConnectionId, RegistryError, Scope};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::Connection;

type Members = HashMap<ConnectionId, Arc<dyn Connection>>;
type Recipients = Vec<(Scope, Arc<dyn Connection>)>;

#[derive(Default)]
struct RegistryState {
    groups: HashMap<AccountId, Members>,
    global: Members,
    /// Where each registered connection lives.
    scopes: HashMap<ConnectionId, Scope>,
}

impl RegistryState {
    fn scope_len(&self, scope: &Scope) -> usize {
        match scope {
            Scope::Global => self.global.len(),
            Scope::Account(account) => self.groups.get(account).map_or(0, HashMap::len),
        }
    }

    fn total(&self) -> usize {
        self.groups.values().map(HashMap::len).sum::<usize>() + self.global.len()
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed; those connections have been dropped.
    pub failed: usize,
}

impl DeliveryReport {
    /// Number of connections the message was addressed to.
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Per-account connection count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountStats {
    /// The account.
    pub account_id: AccountId,
    /// Live connections in its group.
    pub connections: usize,
}

/// Snapshot of registry membership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// All connections, grouped and global.
    pub total: usize,
    /// Global observers.
    pub global: usize,
    /// Groups, sorted by account id.
    pub accounts: Vec<AccountStats>,
}

/// Owns every live client connection for the process.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register an accepted connection under `account`, or globally when
    /// `account` is `None` or empty.
    ///
    /// Returns `Ok(false)` if the connection is already registered in the same
    /// scope. A connection never moves between scopes: registering it
    /// elsewhere fails with [`RegistryError::AlreadyRegistered`].
    pub fn connect(
        &self,
        connection: Arc<dyn Connection>,
        account: Option<&AccountId>,
    ) -> Result<bool, RegistryError> {
        let scope = Scope::from_account(account);
        let id = connection.id().clone();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(existing) = state.scopes.get(&id) {
            if *existing == scope {
                debug!(conn_id = %id, %scope, "connection already registered");
                return Ok(false);
            }
            return Err(RegistryError::AlreadyRegistered {
                connection_id: id,
                existing: existing.clone(),
            });
        }

        let members = match &scope {
            Scope::Global => &mut state.global,
            Scope::Account(account) => state.groups.entry(account.clone()).or_default(),
        };
        let _ = members.insert(id.clone(), connection);
        let connections = members.len();
        let _ = state.scopes.insert(id.clone(), scope.clone());
        drop(guard);

        info!(conn_id = %id, %scope, connections, "websocket connection registered");
        Ok(true)
    }

    /// Remove a connection from `account`'s group (or the global set).
    ///
    /// Idempotent: an unknown connection or missing group is a no-op. The
    /// group entry is deleted once its last member leaves. Returns whether a
    /// connection was removed.
    pub fn disconnect(&self, id: &ConnectionId, account: Option<&AccountId>) -> bool {
        let scope = Scope::from_account(account);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let removed = match &scope {
            Scope::Global => state.global.remove(id).is_some(),
            Scope::Account(account) => match state.groups.get_mut(account) {
                Some(group) => {
                    let removed = group.remove(id).is_some();
                    if group.is_empty() {
                        let _ = state.groups.remove(account);
                    }
                    removed
                }
                None => false,
            },
        };
        if removed {
            let _ = state.scopes.remove(id);
        }
        let connections = state.scope_len(&scope);
        drop(guard);

        if removed {
            info!(conn_id = %id, %scope, connections, "websocket connection removed");
        }
        removed
    }

    /// Send `message` to every connection of `account` and to every global
    /// connection.
    ///
    /// The message is encoded once. Failed sends never abort delivery to the
    /// rest; those connections are dropped after the send pass.
    pub async fn broadcast_to_group<T>(
        &self,
        account: &AccountId,
        message: &T,
    ) -> Result<DeliveryReport, RegistryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let text: Arc<str> = Arc::from(to_wire_string(message)?);
        let recipients = {
            let state = self.state.lock();
            let mut recipients: Recipients = Vec::new();
            if let Some(group) = state.groups.get(account) {
                let scope = Scope::Account(account.clone());
                recipients.extend(group.values().map(|c| (scope.clone(), Arc::clone(c))));
            }
            recipients.extend(state.global.values().map(|c| (Scope::Global, Arc::clone(c))));
            recipients
        };
        debug!(
            account_id = %account,
            recipients = recipients.len(),
            bytes = text.len(),
            "broadcast to group"
        );
        Ok(self.deliver(&text, recipients).await)
    }

    /// Send `message` to every connection in every group and in the global set.
    pub async fn broadcast_to_all<T>(&self, message: &T) -> Result<DeliveryReport, RegistryError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let text: Arc<str> = Arc::from(to_wire_string(message)?);
        let recipients = {
            let state = self.state.lock();
            let mut recipients: Recipients = Vec::with_capacity(state.total());
            for (account, group) in &state.groups {
                let scope = Scope::Account(account.clone());
                recipients.extend(group.values().map(|c| (scope.clone(), Arc::clone(c))));
            }
            recipients.extend(state.global.values().map(|c| (Scope::Global, Arc::clone(c))));
            recipients
        };
        debug!(
            recipients = recipients.len(),
            bytes = text.len(),
            "broadcast to all"
        );
        Ok(self.deliver(&text, recipients).await)
    }

    /// Send `message` to a single connection.
    ///
    /// Does not touch registry state; the caller decides what a `false` means.
    pub async fn send_to_one<T>(&self, connection: &dyn Connection, message: &T) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let text = match to_wire_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(conn_id = %connection.id(), error = %e, "failed to serialize message");
                return false;
            }
        };
        match connection.send_text(Arc::from(text)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conn_id = %connection.id(), error = %e, "failed to send message to connection");
                false
            }
        }
    }

    /// Connections in `account`'s group, or all connections when the account
    /// is absent or empty.
    pub fn count(&self, account: Option<&AccountId>) -> usize {
        let state = self.state.lock();
        match Scope::from_account(account) {
            Scope::Global => state.total(),
            Scope::Account(account) => state.groups.get(&account).map_or(0, HashMap::len),
        }
    }

    /// Accounts with at least one live connection, sorted.
    pub fn list_active_accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.state.lock().groups.keys().cloned().collect();
        accounts.sort();
        accounts
    }

    /// Membership snapshot.
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        let mut accounts: Vec<AccountStats> = state
            .groups
            .iter()
            .map(|(account_id, group)| AccountStats {
                account_id: account_id.clone(),
                connections: group.len(),
            })
            .collect();
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        RegistryStats {
            total: state.total(),
            global: state.global.len(),
            accounts,
        }
    }

    /// Send to every recipient, then drop the ones that failed.
    async fn deliver(&self, text: &Arc<str>, recipients: Recipients) -> DeliveryReport {
        let results = join_all(
            recipients
                .iter()
                .map(|(_, conn)| conn.send_text(Arc::clone(text))),
        )
        .await;

        let mut dead: Vec<(&Scope, &ConnectionId)> = Vec::new();
        for ((scope, conn), result) in recipients.iter().zip(results) {
            if let Err(e) = result {
                warn!(conn_id = %conn.id(), %scope, error = %e, "send failed, dropping connection");
                dead.push((scope, conn.id()));
            }
        }

        let report = DeliveryReport {
            delivered: recipients.len() - dead.len(),
            failed: dead.len(),
        };
        for (scope, id) in dead {
            let _ = self.disconnect(id, scope.account());
        }
        report
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
