use once_cell::sync::OnceCell;
use tracing::info;

use crate::error::{CallError, Result};
use crate::peer::types::{Role, SessionId};
use crate::signaling::SignalingChannel;

/// Single point where a participant learns whether it calls or answers.
///
/// The first participant to claim an empty record becomes the caller; anyone
/// arriving after an offer exists (or after another participant has claimed
/// the record) becomes the callee. The result is written once into `slot`
/// and never re-evaluated.
pub struct RoleResolver;

impl RoleResolver {
    pub async fn resolve(
        channel: &dyn SignalingChannel,
        session_id: &SessionId,
        slot: &OnceCell<Role>,
    ) -> Result<Role> {
        if let Some(role) = slot.get() {
            return Err(CallError::InvalidState(format!(
                "role already resolved as {role} for session {session_id}"
            )));
        }

        let role = if channel.claim_caller(session_id).await? {
            Role::Caller
        } else {
            Role::Callee
        };

        slot.set(role).map_err(|_| {
            CallError::InvalidState(format!("role resolved concurrently for session {session_id}"))
        })?;
        info!("Session {} resolved as {}", session_id, role);
        Ok(role)
    }
}
