//! Discovery messages.
//!
//! The relay forwards discovery requests and responses without interpreting
//! them: resources are opaque byte payloads, and the only field the core
//! reads is `version_info`, to suppress responses the proxy already has.

use bytes::Bytes;

/// A discovery request from a downstream proxy.
///
/// Opaque to the relay except for two uses: the mapper derives an
/// [`AggregatedKey`](crate::AggregatedKey) from it, and `version_info` is
/// compared against cached responses to decide whether to answer
/// immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Version of the configuration the proxy last acknowledged.
    pub version_info: String,
    /// Type URL of the requested resources.
    pub type_url: String,
    /// Names of the requested resources; empty means wildcard.
    pub resource_names: Vec<String>,
    /// Identifier of the requesting node.
    pub node_id: String,
    /// Nonce of the response this request acknowledges, if any.
    pub response_nonce: String,
}

impl DiscoveryRequest {
    /// Create a wildcard request for a resource type.
    #[must_use]
    pub fn new(type_url: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            ..Self::default()
        }
    }

    /// Set the acknowledged version.
    #[must_use]
    pub fn with_version(mut self, version_info: impl Into<String>) -> Self {
        self.version_info = version_info.into();
        self
    }

    /// Set the requesting node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }
}

/// A discovery response from an upstream configuration server.
///
/// Carries a state-of-the-world resource set for one type. The relay stores
/// and forwards it verbatim; only `version_info` is inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResponse {
    /// Version of this configuration.
    pub version_info: String,
    /// Type URL of the contained resources.
    pub type_url: String,
    /// Opaque resource payloads.
    pub resources: Vec<Bytes>,
    /// Nonce identifying this response on the stream.
    pub nonce: String,
    /// Identifier of the control plane that produced the response.
    pub control_plane_id: String,
}

impl DiscoveryResponse {
    /// Create a response with a version, type, and resource payloads.
    #[must_use]
    pub fn new(
        version_info: impl Into<String>,
        type_url: impl Into<String>,
        resources: Vec<Bytes>,
    ) -> Self {
        Self {
            version_info: version_info.into(),
            type_url: type_url.into(),
            resources,
            ..Self::default()
        }
    }

    /// Number of resources in the response.
    #[inline]
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = DiscoveryRequest::new("type.googleapis.com/envoy.api.v2.Listener")
            .with_version("3")
            .with_node_id("sidecar-1");

        assert_eq!(req.type_url, "type.googleapis.com/envoy.api.v2.Listener");
        assert_eq!(req.version_info, "3");
        assert_eq!(req.node_id, "sidecar-1");
        assert!(req.resource_names.is_empty());
    }

    #[test]
    fn response_resource_count() {
        let resp = DiscoveryResponse::new(
            "1",
            "type.googleapis.com/envoy.api.v2.Cluster",
            vec![Bytes::from_static(b"cds resource")],
        );
        assert_eq!(resp.resource_count(), 1);
        assert_eq!(resp.version_info, "1");
    }
}
