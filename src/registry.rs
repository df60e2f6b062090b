use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::contract::Contract;
use crate::descriptor::ExportDescriptor;
use crate::error::{CompositionError, Result};
use crate::providers::ExportDescriptorProvider;
use crate::resolve::ResolutionSession;

/// Resolved exports of one contract, in discovery order
pub type ExportDescriptors = Arc<[Arc<ExportDescriptor>]>;

pub(crate) type DescriptorMap = HashMap<Contract, ExportDescriptors>;

/// Process-lifetime cache of resolved contracts.
///
/// Readers load the current map without locking. Writers serialize on the update lock,
/// resolve the missing contract and publish a new map; a published entry is never
/// mutated. Failed resolutions are not recorded.
pub struct ExportDescriptorRegistry {
    providers: Vec<Arc<dyn ExportDescriptorProvider>>,
    definitions: ArcSwap<DescriptorMap>,
    update_lock: Mutex<()>,
}

impl ExportDescriptorRegistry {
    pub fn new(providers: Vec<Arc<dyn ExportDescriptorProvider>>) -> Self {
        Self {
            providers,
            definitions: ArcSwap::from_pointee(DescriptorMap::new()),
            update_lock: Mutex::new(()),
        }
    }

    /// Every export of the contract, resolving and caching it on first request
    pub fn resolve(&self, contract: &Contract) -> Result<ExportDescriptors> {
        if let Some(found) = self.definitions.load().get(contract) {
            return Ok(found.clone());
        }

        let _guard = self.update_lock.lock();
        let current = self.definitions.load_full();
        if let Some(found) = current.get(contract) {
            return Ok(found.clone());
        }

        debug!(%contract, "resolving contract");
        let mut session = ResolutionSession::new(&self.providers, &current);
        let resolved = match session.execute(contract) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(%contract, error = %err, "contract resolution failed");
                return Err(err);
            }
        };

        let completed = session.into_completed();
        debug!(%contract, published = completed.len(), "publishing resolved contracts");
        let mut updated = DescriptorMap::clone(&current);
        updated.extend(completed);
        self.definitions.store(Arc::new(updated));
        Ok(resolved)
    }

    /// The single export of a singular contract, if any
    pub fn try_get_single(&self, contract: &Contract) -> Result<Option<Arc<ExportDescriptor>>> {
        let all = self.resolve(contract)?;
        match all.len() {
            0 => Ok(None),
            1 => Ok(Some(all[0].clone())),
            n => Err(CompositionError::cardinality(contract, n)),
        }
    }

    /// Number of contracts currently cached
    pub fn cached_contracts(&self) -> usize {
        self.definitions.load().len()
    }
}

impl fmt::Debug for ExportDescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptorRegistry")
            .field("providers", &self.providers.len())
            .field("cached_contracts", &self.cached_contracts())
            .finish()
    }
}
