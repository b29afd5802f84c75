//! Fallback adapter for services without a configured command.

use tracing::info;

use super::{ActionReceipt, AdapterFuture, ServiceAction, ServiceAdapter};

/// Records the intended action and reports it as simulated.
///
/// The router journals simulated receipts separately from executed ones,
/// so an unconfigured service is visible rather than silently "sent".
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordOnlyAdapter;

impl ServiceAdapter for RecordOnlyAdapter {
    fn execute<'a>(&'a self, action: &'a ServiceAction) -> AdapterFuture<'a> {
        Box::pin(async move {
            info!(
                service = action.service().key(),
                action = %action.summary(),
                "no adapter configured; action recorded only"
            );
            Ok(ActionReceipt {
                reference: None,
                simulated: true,
            })
        })
    }
}
