//! In-process rendezvous.
//!
//! Both roles of one process share a `Directory`. Published parameters and
//! ready markers stay until withdrawn.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use visicheck::{Rendezvous, Result};

use crate::port::Endpoint;

#[derive(Debug)]
pub struct Directory<E = Endpoint> {
    published: Mutex<HashMap<String, E>>,
    ready: Mutex<HashSet<String>>,
}

impl<E> Default for Directory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Directory<E> {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(HashMap::new()),
            ready: Mutex::new(HashSet::new()),
        }
    }

    /// Remove `label`'s parameters and ready marker.
    pub fn withdraw(&self, label: &str) {
        lock(&self.published).remove(label);
        lock(&self.ready).remove(label);
    }
}

impl<E: Clone> Rendezvous<E> for Directory<E> {
    fn publish(&self, label: &str, endpoint: E) -> Result<()> {
        lock(&self.published).insert(label.to_owned(), endpoint);
        tracing::trace!("published {}", label);
        Ok(())
    }

    fn discover(&self, label: &str) -> Result<Option<E>> {
        Ok(lock(&self.published).get(label).cloned())
    }

    fn publish_ready(&self, label: &str) -> Result<()> {
        lock(&self.ready).insert(label.to_owned());
        tracing::trace!("{} ready", label);
        Ok(())
    }

    fn is_ready(&self, label: &str) -> Result<bool> {
        Ok(lock(&self.ready).contains(label))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use visicheck::{RunContext, transport};

    use super::*;

    #[test]
    fn publish_discover_withdraw() {
        let dir: Directory<u32> = Directory::new();
        assert_eq!(dir.discover("server").unwrap(), None);

        dir.publish("server", 7).unwrap();
        dir.publish_ready("server").unwrap();
        assert_eq!(dir.discover("server").unwrap(), Some(7));
        assert!(dir.is_ready("server").unwrap());
        assert!(!dir.is_ready("client").unwrap());

        dir.withdraw("server");
        assert_eq!(dir.discover("server").unwrap(), None);
        assert!(!dir.is_ready("server").unwrap());
    }

    #[test]
    fn blocking_discovery_sees_a_late_publish() {
        let dir: Directory<u32> = Directory::new();
        let ctx = RunContext::unbounded();

        let found = thread::scope(|s| {
            let waiter = s.spawn(|| {
                transport::discover_blocking(&dir, "client", Duration::from_millis(1), &ctx)
            });
            thread::sleep(Duration::from_millis(10));
            dir.publish("client", 3).unwrap();
            waiter.join().unwrap()
        });
        assert_eq!(found.unwrap(), 3);
    }

    #[test]
    fn cancelled_wait_gives_up() {
        let dir: Directory<u32> = Directory::new();
        let ctx = RunContext::unbounded();
        ctx.cancel();

        let err = transport::wait_ready::<u32, _>(&dir, "server", Duration::from_millis(1), &ctx)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
