//! Per-link connection handles.

use std::collections::HashMap;

use uuid::Uuid;

use crate::schema::Value;
use crate::transport::LinkId;
use crate::wire::HandleRef;

/// One connected peer, scoped to one transport handler.
///
/// The lifecycle is INACTIVE → ACTIVE → DESTROYED. Activation and
/// destruction are driven by the network manager so their events fire
/// exactly once; the handle itself is plain state.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub uuid: Uuid,
    /// Opaque identifier of the underlying link, owned by the link driver.
    pub link: LinkId,
    /// The remote role of the handler this handle belongs to.
    pub role: String,
    /// Set once the handshake completes.
    pub activated: bool,
    pub destroyed: bool,
    /// Application-local storage for this connection. Never transmitted.
    pub context: HashMap<String, Value>,
    /// Metadata agreed with the peer, replicated via SHARED_PARAMETER
    /// messages. Notably `rp` (repository number) and `vz` (visible zones).
    pub shared_parameters: HashMap<String, Value>,
}

impl ConnectionHandle {
    pub fn new(role: impl Into<String>, link: LinkId) -> Self {
        ConnectionHandle {
            uuid: Uuid::new_v4(),
            link,
            role: role.into(),
            activated: false,
            destroyed: false,
            context: HashMap::new(),
            shared_parameters: HashMap::new(),
        }
    }

    pub fn href(&self) -> HandleRef {
        HandleRef::new(self.role.clone(), self.uuid)
    }

    pub fn shared_parameter(&self, name: &str) -> Option<&Value> {
        self.shared_parameters.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handles_start_inactive() {
        let handle = ConnectionHandle::new("server", 7);
        assert!(!handle.activated);
        assert!(!handle.destroyed);
        assert_eq!(handle.link, 7);
        assert_eq!(handle.href().role, "server");
    }
}
