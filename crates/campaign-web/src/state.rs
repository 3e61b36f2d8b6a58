//! Application state shared across handlers.

use std::collections::HashMap;
use std::sync::Arc;

use campaign::{DeliveryService, Ingestor, InvitationService, OperatorEvent};
use database::Database;
use fanout::Registry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Contact upload pipeline.
    pub ingestor: Ingestor,
    /// Invitation generation.
    pub invitations: InvitationService,
    /// Dispatch and webhook handling.
    pub delivery: DeliveryService,
    /// Open operator event streams.
    pub registry: Arc<Registry<OperatorEvent>>,
    /// Bearer token to operator id.
    pub operators: Arc<HashMap<String, String>>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        db: Database,
        ingestor: Ingestor,
        delivery: DeliveryService,
        registry: Arc<Registry<OperatorEvent>>,
        operators: HashMap<String, String>,
    ) -> Self {
        Self {
            invitations: InvitationService::new(db.clone()),
            db,
            ingestor,
            delivery,
            registry,
            operators: Arc::new(operators),
        }
    }
}
