use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Keyed store of per-session instances, built on first access by a factory.
pub struct InstanceRegistry<T> {
    instances: RwLock<HashMap<String, Arc<T>>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> InstanceRegistry<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            instances: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Returns the instance for `session`, creating it if needed.
    pub fn get(&self, session: &str) -> Arc<T> {
        if let Some(instance) = self.instances.read().get(session) {
            return Arc::clone(instance);
        }

        let mut instances = self.instances.write();
        let instance = instances.entry(session.to_string()).or_insert_with(|| {
            debug!(session, "creating session instance");
            Arc::new((self.factory)())
        });
        Arc::clone(instance)
    }

    /// Installs `instance` under `session`, returning whatever was there.
    pub fn replace(&self, session: &str, instance: T) -> Option<Arc<T>> {
        self.instances
            .write()
            .insert(session.to_string(), Arc::new(instance))
    }

    pub fn remove(&self, session: &str) -> Option<Arc<T>> {
        self.instances.write().remove(session)
    }

    pub fn contains(&self, session: &str) -> bool {
        self.instances.read().contains_key(session)
    }

    /// Session names, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.instances.read().keys().cloned().collect();
        sessions.sort_unstable();
        sessions
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl<T> fmt::Debug for InstanceRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("sessions", &self.sessions())
            .finish_non_exhaustive()
    }
}
