use dashmap::{DashMap, mapref::entry::Entry};

use crate::error::ServerError;

/// Process-wide mapping from hostname to the session serving it.
///
/// Claims are exclusive: a hostname belongs to at most one session at any
/// instant, and stays claimed until the owner cancels the forwarding or
/// disconnects.
pub(crate) struct HostRegistry<H> {
    map: DashMap<String, (usize, H)>,
}

impl<H: Clone> HostRegistry<H> {
    pub(crate) fn new() -> Self {
        HostRegistry {
            map: DashMap::new(),
        }
    }

    // Atomic insert-if-absent. Keys must already be lowercased.
    pub(crate) fn claim(
        &self,
        hostname: String,
        owner: usize,
        handler: H,
    ) -> Result<(), ServerError> {
        match self.map.entry(hostname) {
            Entry::Occupied(_) => Err(ServerError::HostnameAlreadyBound),
            Entry::Vacant(entry) => {
                entry.insert((owner, handler));
                Ok(())
            }
        }
    }

    pub(crate) fn get(&self, hostname: &str) -> Option<H> {
        self.map
            .get(hostname)
            .map(|entry| entry.value().1.clone())
    }

    // Removes the claim only while it still belongs to `owner`. A release
    // racing with a newer claim by another session is a no-op.
    pub(crate) fn release(&self, hostname: &str, owner: usize) {
        self.map
            .remove_if(hostname, |_, (claimed_by, _)| *claimed_by == owner);
    }
}

// Very loose validation to exclude port numbers and URLs. Only meaningful
// for already-lowercased strings.
pub(crate) fn is_valid_hostname(hostname: &str) -> bool {
    hostname
        .bytes()
        .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.'))
}
