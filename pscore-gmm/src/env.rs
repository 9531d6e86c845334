//! Shared core environment
//!
//! Everything sessions share: the message catalogue, configuration,
//! field transforms and the injected collaborators. Built once at startup
//! and handed to every session behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use pscore_common::{CoreConfig, GmmConfig};
use pscore_l3::{Catalogue, DescriptorError, Transforms};
use tracing::info;

use crate::provider::{AccessSecurity, AuthVectorProvider, Scheduler, SubscriberPolicy, Transport};
use crate::sm::pool::AddressPool;

/// Injected collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Subscriber directory and P-TMSI allocation
    pub policy: Arc<dyn SubscriberPolicy>,
    /// Authentication centre
    pub auc: Arc<dyn AuthVectorProvider>,
    /// Downlink PDU sink
    pub transport: Arc<dyn Transport>,
    /// Timer scheduler
    pub scheduler: Arc<dyn Scheduler>,
    /// Radio-level security activation
    pub access_security: Arc<dyn AccessSecurity>,
}

/// Read-only state shared by all sessions.
pub struct CoreEnv {
    /// Message descriptors
    pub catalogue: Catalogue,
    /// Core configuration
    pub config: CoreConfig,
    /// Field transforms applied after decode and before encode
    pub transforms: Transforms,
    /// Subscriber directory and P-TMSI allocation
    pub policy: Arc<dyn SubscriberPolicy>,
    /// Authentication centre
    pub auc: Arc<dyn AuthVectorProvider>,
    /// Downlink PDU sink
    pub transport: Arc<dyn Transport>,
    /// Timer scheduler
    pub scheduler: Arc<dyn Scheduler>,
    /// Radio-level security activation
    pub access_security: Arc<dyn AccessSecurity>,
    /// Dynamic PDP address pool
    pub addresses: AddressPool,
}

impl CoreEnv {
    /// Builds the environment and the GPRS message catalogue.
    pub fn new(config: CoreConfig, collaborators: Collaborators) -> Result<Self, DescriptorError> {
        let catalogue = Catalogue::gprs()?;
        let addresses = AddressPool::new(config.sm.pool_start, config.sm.pool_size);
        info!(
            plmn = %config.gmm.plmn,
            subscribers = config.subscribers.len(),
            pool = config.sm.pool_size,
            "Core environment ready"
        );
        Ok(Self {
            catalogue,
            config,
            transforms: Transforms::new(),
            policy: collaborators.policy,
            auc: collaborators.auc,
            transport: collaborators.transport,
            scheduler: collaborators.scheduler,
            access_security: collaborators.access_security,
            addresses,
        })
    }

    /// Installs field transforms.
    pub fn with_transforms(mut self, transforms: Transforms) -> Self {
        self.transforms = transforms;
        self
    }

    /// Mobility management configuration.
    pub fn gmm(&self) -> &GmmConfig {
        &self.config.gmm
    }
}

impl fmt::Debug for CoreEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreEnv")
            .field("config", &self.config)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}
