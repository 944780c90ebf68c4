use std::sync::{Arc, Weak};

/// Liveness marker held by an open session. Dropping it detaches every
/// collection bound to the session.
#[derive(Debug)]
pub struct SessionToken {
    id: u64,
    alive: Arc<()>,
}

impl SessionToken {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            alive: Arc::new(()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bind(&self) -> SessionBinding {
        SessionBinding {
            session_id: self.id,
            alive: Arc::downgrade(&self.alive),
        }
    }
}

/// Weak link from a lazy collection to the session that loaded its owner
#[derive(Debug, Clone)]
pub struct SessionBinding {
    session_id: u64,
    alive: Weak<()>,
}

impl SessionBinding {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn is_open(&self) -> bool {
        self.alive.strong_count() > 0
    }

    pub fn belongs_to(&self, token: &SessionToken) -> bool {
        self.session_id == token.id && self.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_detaches_on_drop() {
        let token = SessionToken::new(7);
        let binding = token.bind();
        assert!(binding.is_open());
        assert!(binding.belongs_to(&token));

        let other = SessionToken::new(8);
        assert!(!binding.belongs_to(&other));

        drop(token);
        assert!(!binding.is_open());
        assert_eq!(binding.session_id(), 7);
    }
}
