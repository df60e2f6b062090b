//! Resolution session: turns a missing contract into descriptors
//!
//! The session queries every provider for the contract, enumerates the dependencies of
//! each promise, resolves prerequisite dependencies depth-first while tracking the chain
//! of contracts in progress, and finalizes the promises once their dependencies are known.
//!
//! Non-prerequisite dependencies (deferred and factory targets) stay off the chain: they
//! are queued and resolved once the requesting chain has completed. This is what lets a
//! deferred import break a cycle, since the consumer only needs the wrapper's descriptor.
//!
//! Providers are queried once per contract and session. Promises collected because a
//! wrapping provider enumerated their contract are kept until that contract is built.
//!
//! Nothing is published unless the whole session succeeds.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::trace;

use crate::contract::Contract;
use crate::descriptor::{
    CompositionDependency, DependencyRequest, ExportDescriptor, ExportDescriptorPromise, ExportTarget,
    ImportCardinality, ResolvedDependencies,
};
use crate::error::{CompositionError, Result};
use crate::providers::{DependencyAccessor, ExportDescriptorProvider};
use crate::registry::{DescriptorMap, ExportDescriptors};

pub(crate) struct ResolutionSession<'a> {
    providers: &'a [Arc<dyn ExportDescriptorProvider>],
    published: &'a DescriptorMap,
    completed: DescriptorMap,
    // promises collected for enumeration, not yet built
    partial: HashMap<Contract, Vec<ExportDescriptorPromise>>,
    // exports of every contract whose providers were queried
    discovered: HashMap<Contract, Vec<ExportTarget>>,
    querying: Vec<Contract>,
    chain: Vec<Contract>,
    pending: VecDeque<DependencyRequest>,
}

impl<'a> ResolutionSession<'a> {
    pub(crate) fn new(providers: &'a [Arc<dyn ExportDescriptorProvider>], published: &'a DescriptorMap) -> Self {
        Self {
            providers,
            published,
            completed: DescriptorMap::new(),
            partial: HashMap::new(),
            discovered: HashMap::new(),
            querying: Vec::new(),
            chain: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Resolve the contract and everything it transitively depends on
    pub(crate) fn execute(&mut self, contract: &Contract) -> Result<ExportDescriptors> {
        let resolved = self.resolve(contract)?;
        while let Some(request) = self.pending.pop_front() {
            let targets = self.resolve(&request.contract)?;
            check_cardinality(&request, &targets)?;
        }
        Ok(resolved)
    }

    pub(crate) fn into_completed(self) -> DescriptorMap {
        self.completed
    }

    fn lookup(&self, contract: &Contract) -> Option<ExportDescriptors> {
        self.completed
            .get(contract)
            .or_else(|| self.published.get(contract))
            .cloned()
    }

    fn resolve(&mut self, contract: &Contract) -> Result<ExportDescriptors> {
        if let Some(found) = self.lookup(contract) {
            return Ok(found);
        }

        if let Some(err) = cycle(&self.chain, contract) {
            return Err(err);
        }

        self.chain.push(contract.clone());
        let result = self.build(contract);
        self.chain.pop();

        let descriptors = result?;
        self.completed.insert(contract.clone(), descriptors.clone());
        Ok(descriptors)
    }

    fn build(&mut self, contract: &Contract) -> Result<ExportDescriptors> {
        let promises = match self.partial.remove(contract) {
            Some(promises) => promises,
            None => self.collect_promises(contract)?,
        };

        let mut descriptors = Vec::with_capacity(promises.len());
        for promise in promises {
            let (origin, metadata, dependencies, finalize) = promise.into_parts();
            let mut resolved = Vec::new();
            for request in dependencies()? {
                resolved.push(self.resolve_dependency(request)?);
            }
            let activator = finalize(&ResolvedDependencies::new(resolved))?;
            descriptors.push(Arc::new(ExportDescriptor::assemble(activator, metadata, &origin)));
        }
        Ok(descriptors.into())
    }

    /// Query every provider for the contract and record the exports they promise
    fn collect_promises(&mut self, contract: &Contract) -> Result<Vec<ExportDescriptorPromise>> {
        if let Some(err) = cycle(&self.querying, contract) {
            return Err(err);
        }

        self.querying.push(contract.clone());
        let collected = self.query_providers(contract);
        self.querying.pop();

        let promises = collected?;
        trace!(%contract, promises = promises.len(), "collected export promises");
        let targets = promises
            .iter()
            .enumerate()
            .map(|(index, promise)| ExportTarget::of_promise(contract, index, promise))
            .collect();
        self.discovered.insert(contract.clone(), targets);
        Ok(promises)
    }

    fn query_providers(&mut self, contract: &Contract) -> Result<Vec<ExportDescriptorPromise>> {
        let providers = self.providers;
        let mut promises = Vec::new();
        for provider in providers {
            promises.extend(provider.get_export_descriptors(contract, &mut *self)?);
        }
        Ok(promises)
    }

    fn resolve_dependency(&mut self, request: DependencyRequest) -> Result<CompositionDependency> {
        if !request.prerequisite {
            match self.lookup(&request.contract) {
                Some(targets) => check_cardinality(&request, &targets)?,
                None => self.pending.push_back(request.clone()),
            }
            return Ok(CompositionDependency {
                request,
                targets: Vec::new(),
            });
        }

        let targets = self.resolve(&request.contract)?;
        check_cardinality(&request, &targets)?;
        Ok(CompositionDependency {
            request,
            targets: targets.to_vec(),
        })
    }
}

impl DependencyAccessor for ResolutionSession<'_> {
    fn exports_of(&mut self, contract: &Contract) -> Result<Vec<ExportTarget>> {
        if let Some(found) = self.lookup(contract) {
            return Ok(found
                .iter()
                .enumerate()
                .map(|(index, descriptor)| ExportTarget::of_descriptor(contract, index, descriptor))
                .collect());
        }
        if !self.discovered.contains_key(contract) {
            let promises = self.collect_promises(contract)?;
            self.partial.insert(contract.clone(), promises);
        }
        Ok(self.discovered.get(contract).cloned().unwrap_or_default())
    }
}

/// Error naming the path from the first occurrence of `contract` back to itself
fn cycle(in_progress: &[Contract], contract: &Contract) -> Option<CompositionError> {
    let start = in_progress.iter().position(|c| c == contract)?;
    let chain = in_progress[start..]
        .iter()
        .chain(std::iter::once(contract))
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    Some(CompositionError::CyclicDependency { chain })
}

fn check_cardinality(request: &DependencyRequest, targets: &ExportDescriptors) -> Result<()> {
    let acceptable = match request.cardinality {
        ImportCardinality::Required => targets.len() == 1,
        ImportCardinality::Optional => targets.len() <= 1,
        ImportCardinality::Many => true,
    };
    if acceptable {
        Ok(())
    } else {
        Err(CompositionError::cardinality(&request.contract, targets.len()).at_site(&request.site))
    }
}
