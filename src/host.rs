use std::fmt;
use std::sync::Arc;

use crate::contract::Contract;
use crate::descriptor::Instance;
use crate::error::Result;
use crate::lifetime::{CompositionContext, LifetimeContext};
use crate::parts::{Part, PartDescriptor, TypedPartExportDescriptorProvider};
use crate::providers::{builtin_providers, ExportDescriptorProvider};
use crate::registry::ExportDescriptorRegistry;

/// A composition container.
///
/// Owns its registry and the root of its scope tree; nothing is shared between hosts.
pub struct CompositionHost {
    root: LifetimeContext,
}

impl CompositionHost {
    /// Create a host running the built-in providers followed by the given ones
    pub fn new(providers: Vec<Arc<dyn ExportDescriptorProvider>>) -> Self {
        let mut all = builtin_providers();
        all.extend(providers);
        let registry = Arc::new(ExportDescriptorRegistry::new(all));
        Self {
            root: LifetimeContext::root(registry),
        }
    }

    /// The root lifetime context, owner of container-wide shared instances
    pub fn root(&self) -> &LifetimeContext {
        &self.root
    }

    /// Open a child context entering the given sharing boundaries
    pub fn begin_scope<S: AsRef<str>>(&self, boundaries: &[S]) -> LifetimeContext {
        self.root.begin_scope(boundaries)
    }

    /// Release the root context and every container-wide shared instance
    pub fn dispose(&self) {
        self.root.dispose();
    }
}

impl CompositionContext for CompositionHost {
    fn try_get_export(&self, contract: &Contract) -> Result<Option<Instance>> {
        self.root.try_get_export(contract)
    }
}

impl fmt::Debug for CompositionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionHost").field("root", &self.root).finish()
    }
}

/// Collects parts and providers, then builds a [CompositionHost]
#[derive(Default)]
pub struct ContainerConfiguration {
    parts: Vec<PartDescriptor>,
    providers: Vec<Arc<dyn ExportDescriptorProvider>>,
}

impl ContainerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part(mut self, part: PartDescriptor) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_parts(mut self, parts: impl IntoIterator<Item = PartDescriptor>) -> Self {
        self.parts.extend(parts);
        self
    }

    /// Add a part type describing itself
    pub fn with_part_type<P: Part>(self) -> Self {
        self.with_part(P::descriptor())
    }

    /// Add a provider, run after the built-in ones and before the declared parts
    pub fn with_provider(mut self, provider: impl ExportDescriptorProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn create_container(self) -> CompositionHost {
        let mut providers = self.providers;
        if !self.parts.is_empty() {
            providers.push(Arc::new(TypedPartExportDescriptorProvider::new(self.parts)));
        }
        CompositionHost::new(providers)
    }
}

impl fmt::Debug for ContainerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfiguration")
            .field("parts", &self.parts.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}
