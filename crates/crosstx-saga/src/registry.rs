use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crosstx_core::OperationKind;

use crate::handler::CompensationHandler;

/// Flat lookup from operation kind to the handler that compensates it.
///
/// Exactly one handler per kind; registering again replaces the previous
/// handler.
#[derive(Default, Clone)]
pub struct CompensationRegistry {
    handlers: HashMap<OperationKind, Arc<dyn CompensationHandler>>,
}

impl CompensationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, returning the handler it replaced.
    pub fn register(
        &mut self,
        kind: OperationKind,
        handler: Arc<dyn CompensationHandler>,
    ) -> Option<Arc<dyn CompensationHandler>> {
        self.handlers.insert(kind, handler)
    }

    pub fn unregister(&mut self, kind: OperationKind) -> Option<Arc<dyn CompensationHandler>> {
        self.handlers.remove(&kind)
    }

    #[must_use]
    pub fn get_handler(&self, kind: OperationKind) -> Option<Arc<dyn CompensationHandler>> {
        self.handlers.get(&kind).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, kind: OperationKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    #[must_use]
    pub fn registered_kinds(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|kind| self.is_registered(*kind))
            .collect()
    }
}

impl fmt::Debug for CompensationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in self.registered_kinds() {
            if let Some(handler) = self.handlers.get(&kind) {
                map.entry(&kind, &handler.name());
            }
        }
        map.finish()
    }
}
