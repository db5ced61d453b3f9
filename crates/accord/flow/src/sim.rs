//! In-process network of party nodes sharing one ordering authority.
//!
//! Identities are derived from party names, so a node restarted under the
//! same name with the same journal sees its own records again. Not for use
//! outside tests and demos.

use std::collections::BTreeMap;
use std::sync::Arc;

use accord_crypto::{Ed25519Signer, SigningService};
use accord_notary::{InMemoryNotary, OrderingAuthority};
use accord_types::{ContentHash, Party};
use accord_vault::{RecordStore, Vault};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{FlowConfig, NodeConfig, VaultConfig};
use crate::directory::NetworkMap;
use crate::node::{NodeServices, PartyNode};
use crate::transport::{InMemoryNetwork, IncomingSession};
use crate::{FlowError, FlowResult};

const SEED_DOMAIN: &[u8] = b"accord-sim-seed:";

/// Deterministic signer for `name`.
pub fn simulated_signer(name: &str) -> Ed25519Signer {
    let seed = ContentHash::hash_tagged(SEED_DOMAIN, name.as_bytes());
    Ed25519Signer::from_seed(name, *seed.as_bytes())
}

pub struct SimNetwork {
    map: Arc<NetworkMap>,
    network: Arc<InMemoryNetwork>,
    notary: Arc<InMemoryNotary>,
    nodes: BTreeMap<String, Arc<PartyNode>>,
    responders: Vec<JoinHandle<()>>,
}

impl SimNetwork {
    pub fn new(authority_name: &str) -> Self {
        Self::with_notary(Arc::new(InMemoryNotary::new(simulated_signer(
            authority_name,
        ))))
    }

    /// Network around an existing authority, which keeps its history across
    /// networks built on it.
    pub fn with_notary(notary: Arc<InMemoryNotary>) -> Self {
        let map = NetworkMap::new();
        map.register_authority(notary.identity().clone());
        Self {
            map,
            network: InMemoryNetwork::new(),
            notary,
            nodes: BTreeMap::new(),
            responders: Vec::new(),
        }
    }

    /// Add a party with an in-memory vault.
    pub async fn add_party(&mut self, name: &str) -> FlowResult<Arc<PartyNode>> {
        self.add_node(&NodeConfig::for_party(name)).await
    }

    /// Add a party as described by `config`, opening its journal if any.
    pub async fn add_node(&mut self, config: &NodeConfig) -> FlowResult<Arc<PartyNode>> {
        let store: Arc<dyn RecordStore> = match &config.vault {
            VaultConfig::Memory => Arc::new(Vault::in_memory()),
            VaultConfig::Journal { path } => Arc::new(Vault::open(path).await?),
        };
        self.add_with_store(&config.party, store, &config.flow)
    }

    pub fn add_with_store(
        &mut self,
        name: &str,
        store: Arc<dyn RecordStore>,
        flow: &FlowConfig,
    ) -> FlowResult<Arc<PartyNode>> {
        if self.nodes.contains_key(name) {
            return Err(FlowError::Validation(format!("party {name} already exists")));
        }
        let signer = simulated_signer(name);
        let me = signer.identity().clone();
        self.map.register_party(me.clone());
        let inbox = self.network.register(&me);

        let node = Arc::new(PartyNode::new(
            NodeServices {
                signer: Arc::new(signer),
                directory: Arc::new(self.map.directory_for(me.clone())),
                transport: Arc::new(self.network.endpoint(me.clone())),
                authority: Arc::clone(&self.notary) as Arc<dyn OrderingAuthority>,
                store,
            },
            flow,
        ));
        self.responders.push(node.serve(inbox));
        self.nodes.insert(name.to_string(), Arc::clone(&node));
        info!(party = %me, "party joined network");
        Ok(node)
    }

    /// Register `name` on the network without serving its inbox; sessions to
    /// it open but never get an answer.
    pub fn add_silent_party(&mut self, name: &str) -> (Party, mpsc::Receiver<IncomingSession>) {
        let me = simulated_signer(name).identity().clone();
        self.map.register_party(me.clone());
        let inbox = self.network.register(&me);
        (me, inbox)
    }

    pub fn node(&self, name: &str) -> Option<Arc<PartyNode>> {
        self.nodes.get(name).cloned()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PartyNode>> {
        self.nodes.values()
    }

    pub fn notary(&self) -> &Arc<InMemoryNotary> {
        &self.notary
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }
}

impl Drop for SimNetwork {
    fn drop(&mut self) {
        for handle in &self.responders {
            handle.abort();
        }
    }
}
