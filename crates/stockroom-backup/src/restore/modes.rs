//! Restore strategies: full replace, merge add, and merge update
//!
//! Each strategy decides what happens to an entity from the document given
//! whether an entity with the same ID already exists in the caller's scope.

use stockroom_core::types::{EntityKind, RestoreStrategy};
use tracing::debug;

use super::RestoreError;

/// Action to take for one entity from the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreAction {
    /// Store a new entity
    Create,
    /// Overwrite the existing entity, keeping its storage ID
    Update,
    /// Leave the existing entity alone
    Skip { reason: String },
}

/// Strategy-specific reconciliation behavior
pub trait StrategyHandler: Send + Sync {
    /// Action for an entity whose document ID is already known
    fn on_existing(&self, kind: EntityKind, doc_id: &str) -> RestoreAction;

    /// Action for an entity seen for the first time. Every strategy creates.
    fn on_new(&self, _kind: EntityKind, _doc_id: &str) -> RestoreAction {
        RestoreAction::Create
    }
}

/// Handler for full replace. Existing data was cleared before streaming.
pub struct FullReplaceHandler;

impl StrategyHandler for FullReplaceHandler {
    fn on_existing(&self, kind: EntityKind, doc_id: &str) -> RestoreAction {
        debug!("Full replace: creating {} {} again", kind, doc_id);
        RestoreAction::Create
    }
}

/// Handler for merge add
pub struct MergeAddHandler;

impl StrategyHandler for MergeAddHandler {
    fn on_existing(&self, kind: EntityKind, doc_id: &str) -> RestoreAction {
        debug!("Merge add: skipping existing {} {}", kind, doc_id);
        RestoreAction::Skip {
            reason: format!("{} already exists (merge add)", kind),
        }
    }
}

/// Handler for merge update
pub struct MergeUpdateHandler;

impl StrategyHandler for MergeUpdateHandler {
    fn on_existing(&self, kind: EntityKind, doc_id: &str) -> RestoreAction {
        debug!("Merge update: updating existing {} {}", kind, doc_id);
        RestoreAction::Update
    }
}

/// Handler implementing `strategy`
pub fn handler_for(strategy: RestoreStrategy) -> Box<dyn StrategyHandler> {
    match strategy {
        RestoreStrategy::FullReplace => Box::new(FullReplaceHandler),
        RestoreStrategy::MergeAdd => Box::new(MergeAddHandler),
        RestoreStrategy::MergeUpdate => Box::new(MergeUpdateHandler),
    }
}

/// Parse a strategy name as given on the command line or in a queued run
pub fn parse_strategy(s: &str) -> Result<RestoreStrategy, RestoreError> {
    s.parse()
        .map_err(|_| RestoreError::InvalidStrategy(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        let kind = EntityKind::Commodity;

        for strategy in [
            RestoreStrategy::FullReplace,
            RestoreStrategy::MergeAdd,
            RestoreStrategy::MergeUpdate,
        ] {
            assert_eq!(handler_for(strategy).on_new(kind, "c1"), RestoreAction::Create);
        }

        assert_eq!(
            handler_for(RestoreStrategy::FullReplace).on_existing(kind, "c1"),
            RestoreAction::Create
        );
        assert!(matches!(
            handler_for(RestoreStrategy::MergeAdd).on_existing(kind, "c1"),
            RestoreAction::Skip { .. }
        ));
        assert_eq!(
            handler_for(RestoreStrategy::MergeUpdate).on_existing(kind, "c1"),
            RestoreAction::Update
        );
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(
            parse_strategy("merge-update").unwrap(),
            RestoreStrategy::MergeUpdate
        );
        let err = parse_strategy("wipe").unwrap_err();
        assert!(matches!(err, RestoreError::InvalidStrategy(ref s) if s == "wipe"));
    }
}
