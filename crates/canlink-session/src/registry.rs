//! Interface enumeration and fallback connection

use std::collections::BTreeMap;
use std::sync::Arc;

use canlink_core::{
    CandidateFailure, ExhaustedError, InterfaceDescriptor, TransportCapability, TransportError,
    TransportHandle, TransportKind,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::transport::default_capabilities;

/// Transport capabilities by hardware family
///
/// Fallback policy is data: callers pass an ordered candidate list and the
/// registry tries each one with the capability registered for its kind.
#[derive(Default)]
pub struct InterfaceRegistry {
    capabilities: RwLock<BTreeMap<TransportKind, Arc<dyn TransportCapability>>>,
}

impl InterfaceRegistry {
    /// An empty registry; every open fails until capabilities are registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the capabilities built for this platform
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for capability in default_capabilities() {
            registry.register(capability);
        }
        registry
    }

    /// Register a capability, replacing any previous one of the same kind
    pub fn register(&self, capability: Arc<dyn TransportCapability>) {
        let kind = capability.kind();
        if self.capabilities.write().insert(kind, capability).is_some() {
            debug!(%kind, "Replaced transport capability");
        } else {
            debug!(%kind, "Registered transport capability");
        }
    }

    /// Kinds that have a registered capability
    pub fn kinds(&self) -> Vec<TransportKind> {
        self.capabilities.read().keys().copied().collect()
    }

    pub fn capability(&self, kind: TransportKind) -> Option<Arc<dyn TransportCapability>> {
        self.capabilities.read().get(&kind).cloned()
    }

    /// Probed channels followed by `configured`, without duplicates
    ///
    /// A configured descriptor naming the same target as a probed one takes
    /// its place, keeping the configured name. A failing probe counts as
    /// "no channels".
    pub async fn enumerate(&self, configured: &[InterfaceDescriptor]) -> Vec<InterfaceDescriptor> {
        let capabilities: Vec<Arc<dyn TransportCapability>> =
            self.capabilities.read().values().cloned().collect();

        let mut found: Vec<InterfaceDescriptor> = Vec::new();
        for capability in capabilities {
            match capability.probe().await {
                Ok(descriptors) => {
                    debug!(kind = %capability.kind(), count = descriptors.len(), "Probed channels");
                    for descriptor in descriptors {
                        if !found.iter().any(|known| known.same_target(&descriptor)) {
                            found.push(descriptor);
                        }
                    }
                }
                Err(e) => {
                    warn!(kind = %capability.kind(), error = %e, "Probe failed, treating as absent");
                }
            }
        }

        for descriptor in configured {
            match found.iter().position(|known| known.same_target(descriptor)) {
                Some(pos) => found[pos] = descriptor.clone(),
                None => found.push(descriptor.clone()),
            }
        }
        found
    }

    /// Open one interface with the capability registered for its kind
    pub async fn open(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let capability = self.capability(descriptor.kind()).ok_or_else(|| {
            TransportError::Unavailable(format!(
                "no driver registered for {}",
                descriptor.kind()
            ))
        })?;
        capability.open(descriptor).await
    }

    /// Try `candidates` strictly in order; the first that opens wins
    pub async fn connect_first_available(
        &self,
        candidates: &[InterfaceDescriptor],
    ) -> Result<(InterfaceDescriptor, Box<dyn TransportHandle>), ExhaustedError> {
        let mut attempts = Vec::with_capacity(candidates.len());

        for descriptor in candidates {
            debug!(%descriptor, "Trying interface candidate");
            match self.open(descriptor).await {
                Ok(handle) => {
                    info!(%descriptor, skipped = attempts.len(), "Interface candidate opened");
                    return Ok((descriptor.clone(), handle));
                }
                Err(error) => {
                    info!(%descriptor, error = %error, "Interface candidate unavailable");
                    attempts.push(CandidateFailure {
                        descriptor: descriptor.clone(),
                        error,
                    });
                }
            }
        }

        warn!(attempted = attempts.len(), "No interface candidate could be opened");
        Err(ExhaustedError { attempts })
    }
}

impl std::fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
