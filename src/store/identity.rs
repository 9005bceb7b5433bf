use tokio::sync::mpsc;
use uuid::Uuid;

/// Change in the authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Uuid),
    SignedOut,
}

/// Capability contract for the identity provider. Subscribers receive the
/// current state immediately, then every subsequent transition.
pub trait IdentityProvider: Send + Sync + 'static {
    fn subscribe_auth(&self) -> mpsc::UnboundedReceiver<AuthEvent>;
}
