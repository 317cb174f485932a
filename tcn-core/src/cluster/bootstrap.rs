use super::types::ClusterLayout;
use crate::{Result, TcnError};
use crate::identity::Identity;
use crate::node_config::BootstrapSet;

/// Accumulates identities and their bootstrap addresses in node-index order
/// until every node of the cluster has one.
pub struct BootstrapContext<'a> {
    layout: &'a ClusterLayout,
    identities: Vec<Identity>,
    addresses: Vec<String>,
}

/// Frozen result of a [`BootstrapContext`]: one identity per node and the
/// bootstrap set every node configuration is built from.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub identities: Vec<Identity>,
    pub bootstrap: BootstrapSet,
}

impl<'a> BootstrapContext<'a> {
    pub fn new(layout: &'a ClusterLayout) -> Self {
        Self {
            layout,
            identities: Vec::with_capacity(layout.node_count),
            addresses: Vec::with_capacity(layout.node_count),
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Appends the identity of the next node index.
    pub fn push(&mut self, identity: Identity) -> Result<()> {
        let index = self.identities.len();
        let address = self.layout.bootstrap_address(index, &identity.peer_id)?;
        self.addresses.push(address);
        self.identities.push(identity);
        Ok(())
    }

    pub fn freeze(self) -> Result<ClusterPlan> {
        if self.identities.len() != self.layout.node_count {
            return Err(TcnError::Internal(format!(
                "bootstrap context holds {} identities for {} nodes",
                self.identities.len(),
                self.layout.node_count
            )));
        }

        let bootstrap = BootstrapSet::parse(&self.addresses)?;
        Ok(ClusterPlan {
            identities: self.identities,
            bootstrap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DEFAULT_KEY_BITS, KeyType, generate_identity};

    fn generated() -> Identity {
        generate_identity(KeyType::Ed25519, DEFAULT_KEY_BITS).unwrap()
    }

    #[test]
    fn freezes_in_index_order() {
        let layout = ClusterLayout::new(2);
        let first = generated();
        let second = generated();

        let mut context = BootstrapContext::new(&layout);
        context.push(first.clone()).unwrap();
        context.push(second.clone()).unwrap();
        assert_eq!(context.len(), 2);

        let plan = context.freeze().unwrap();
        assert_eq!(plan.identities, vec![first.clone(), second.clone()]);

        let peers = plan.bootstrap.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].port, 4000);
        assert_eq!(peers[0].peer_id.to_string(), first.peer_id);
        assert_eq!(peers[1].port, 4001);
        assert_eq!(peers[1].peer_id.to_string(), second.peer_id);
    }

    #[test]
    fn rejects_incomplete_plan() {
        let layout = ClusterLayout::new(3);
        let mut context = BootstrapContext::new(&layout);
        context.push(generated()).unwrap();
        assert!(matches!(context.freeze(), Err(TcnError::Internal(_))));
    }

    #[test]
    fn rejects_extra_identities() {
        let layout = ClusterLayout::new(1);
        let mut context = BootstrapContext::new(&layout);
        context.push(generated()).unwrap();
        assert!(context.push(generated()).is_err());
    }

    #[test]
    fn invalid_peer_id_fails_whole_plan() {
        let layout = ClusterLayout::new(2);
        let mut context = BootstrapContext::new(&layout);
        context.push(generated()).unwrap();
        // valid base58, but not a multihash
        context
            .push(Identity {
                peer_id: "QmFirst".to_string(),
                priv_key: String::new(),
            })
            .unwrap();
        assert!(matches!(
            context.freeze(),
            Err(TcnError::BootstrapParseFailed { .. })
        ));
    }
}
