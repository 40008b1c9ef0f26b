//! Identity resolution for connections.
//!
//! Clients may send an `X-User-Id` header with their websocket
//! upgrade. The resolver accepts a UUID-shaped token and nothing
//! else; anonymous connections simply resolve to `None`.

use taleweaver_domain::UserId;

use crate::infrastructure::ports::IdentityPort;

pub struct HeaderIdentity;

impl HeaderIdentity {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityPort for HeaderIdentity {
    fn optional_user_id(&self, token: Option<&str>) -> Option<UserId> {
        let token = token?.trim();
        match token.parse::<UserId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!(token_len = token.len(), "Ignoring malformed user id token");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_tokens_resolve() {
        let identity = HeaderIdentity::new();
        let id = UserId::new();
        let resolved = identity.optional_user_id(Some(&id.to_string()));
        assert_eq!(resolved, Some(id));
    }

    #[test]
    fn garbage_and_absence_resolve_to_none() {
        let identity = HeaderIdentity::new();
        assert_eq!(identity.optional_user_id(Some("not-a-uuid")), None);
        assert_eq!(identity.optional_user_id(None), None);
    }
}
