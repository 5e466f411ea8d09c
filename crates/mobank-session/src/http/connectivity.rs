/*
[INPUT]:  Platform reachability callbacks
[OUTPUT]: Online/offline answer consulted before every request
[POS]:    HTTP layer - connectivity collaborator
[UPDATE]: When reachability sources change
*/

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reports whether the device can currently reach the network.
pub trait Connectivity: Send + Sync + Debug {
    fn is_online(&self) -> bool;
}

/// Reachability flag flipped by the host. Clones share state.
#[derive(Debug, Clone)]
pub struct SharedConnectivity {
    online: Arc<AtomicBool>,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_connectivity_toggles() {
        let connectivity = SharedConnectivity::default();
        let handle = connectivity.clone();
        assert!(connectivity.is_online());
        handle.set_online(false);
        assert!(!connectivity.is_online());
    }
}
