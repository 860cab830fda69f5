//! User registry
//!
//! Maps display names to sessions, with a reverse index from session id
//! to name. Both maps change together so a name in the registry always
//! resolves to a registered session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::CommandError;
use crate::session::Session;
use crate::types::SessionId;

/// Registry behind the exclusive lock shared by acceptor and dispatcher
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Active sessions by name
#[derive(Debug, Default)]
pub struct Registry {
    /// Display name -> session
    by_name: HashMap<String, Arc<Session>>,
    /// Session id -> display name
    names: HashMap<SessionId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry wrapped for sharing
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Session registered under `name`
    pub fn get(&self, name: &str) -> Option<&Arc<Session>> {
        self.by_name.get(name)
    }

    /// Session with the given id
    pub fn session(&self, id: SessionId) -> Option<&Arc<Session>> {
        self.names.get(&id).and_then(|name| self.by_name.get(name))
    }

    /// Current name of the session with the given id
    pub fn name_of(&self, id: SessionId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered sessions, in no particular order
    pub fn sessions(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.by_name.values()
    }

    /// `preferred` if free, otherwise `preferred#<short id>`
    pub fn available_name(&self, preferred: &str, id: SessionId) -> String {
        if self.contains_name(preferred) {
            format!("{}#{}", preferred, id.short())
        } else {
            preferred.to_string()
        }
    }

    /// Register a session under its current name
    ///
    /// Returns false and changes nothing if the name or id is taken.
    pub fn insert(&mut self, session: Arc<Session>) -> bool {
        let name = session.name();
        let id = session.id();
        if self.by_name.contains_key(&name) || self.names.contains_key(&id) {
            return false;
        }
        self.names.insert(id, name.clone());
        self.by_name.insert(name, session);
        true
    }

    /// Unregister a session by id
    pub fn remove(&mut self, id: SessionId) -> Option<Arc<Session>> {
        let name = self.names.remove(&id)?;
        self.by_name.remove(&name)
    }

    /// Move a session to a new name, returning the old one
    ///
    /// The session's own name field is updated in the same step.
    pub fn rename(&mut self, id: SessionId, new_name: &str) -> Result<String, CommandError> {
        if self.by_name.contains_key(new_name) {
            return Err(CommandError::NameTaken);
        }
        let Some(old_name) = self.names.get(&id).cloned() else {
            return Err(CommandError::Offline(id.to_string()));
        };
        let Some(session) = self.by_name.remove(&old_name) else {
            return Err(CommandError::Offline(old_name));
        };

        session.set_name(new_name);
        self.by_name.insert(new_name.to_string(), session);
        self.names.insert(id, new_name.to_string());
        Ok(old_name)
    }

    /// Both maps describe the same set of sessions
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.by_name.len(), self.names.len());
        for (id, name) in &self.names {
            let session = self.by_name.get(name).expect("indexed name missing");
            assert_eq!(session.id(), *id);
            assert_eq!(&session.name(), name);
        }
    }
}
