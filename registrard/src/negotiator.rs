use std::collections::BTreeSet;

/// Picks the wire protocol a client and this registrar will speak.
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    supported: BTreeSet<u32>,
}

impl ProtocolNegotiator {
    pub fn new(supported: impl IntoIterator<Item = u32>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
        }
    }

    pub fn supported(&self) -> Vec<u32> {
        self.supported.iter().copied().collect()
    }

    /// Newest version both sides support, or None when there is no overlap.
    pub fn choose_protocol(&self, client_supported: &[u32]) -> Option<u32> {
        let chosen = client_supported
            .iter()
            .copied()
            .filter(|p| self.supported.contains(p))
            .max();

        match chosen {
            Some(protocol) => tracing::debug!("Negotiated protocol {}", protocol),
            None => tracing::debug!(
                "No common protocol between registrar {:?} and client {:?}",
                self.supported,
                client_supported
            ),
        }

        chosen
    }
}
