use wabridge_core::SessionStatus;

/// In-memory runtime view of one supervised session. Distinct from
/// `wabridge_store::SessionRecord`: this holds ephemeral state (like the
/// current QR payload) that is never persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub wa_id: Option<String>,
    pub qr: Option<String>,
}
