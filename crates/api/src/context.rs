use formwork_auth::Session;
use formwork_core::UserId;
use formwork_infra::upstream::Clients;

/// Authenticated request context, inserted by the session middleware.
///
/// Present on every protected route.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
    clients: Clients,
}

impl SessionContext {
    pub fn new(session: Session, clients: Clients) -> Self {
        Self { session, clients }
    }

    pub fn user_id(&self) -> UserId {
        self.session.user_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Bot client plus a user client built from the session token.
    pub fn clients(&self) -> &Clients {
        &self.clients
    }
}
