use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ReactionError;
use crate::item::ReactionKind;
use crate::transport::Transport;

/// Single-attempt reaction submission, one at a time.
pub struct ReactionGateway {
    transport: Arc<dyn Transport>,
    submitting: AtomicBool,
}

/// Clears the busy flag even when the submitting future is dropped mid-flight.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReactionGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            submitting: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Submits `kind` for `item_id` once. A call made while another is
    /// outstanding resolves to [`ReactionError::Busy`] on its first poll,
    /// without reaching the transport.
    pub async fn submit(
        &self,
        item_id: i64,
        kind: ReactionKind,
        cancel: &CancellationToken,
    ) -> Result<(), ReactionError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(item_id, reaction = kind.key(), "rejected reaction, gateway busy");
            return Err(ReactionError::Busy);
        }
        let _guard = SubmitGuard(&self.submitting);

        match self
            .transport
            .post_reaction(item_id, kind.value(), cancel.clone())
            .await
        {
            Ok(()) => {
                info!(item_id, reaction = kind.key(), "reaction recorded");
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                debug!(item_id, "reaction submission cancelled");
                Err(err.into())
            }
            Err(err) => {
                warn!(item_id, reaction = kind.key(), error = %err, "failed to submit reaction");
                Err(err.into())
            }
        }
    }
}
