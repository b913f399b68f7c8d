//! Managed-image classification from control plane image metadata

use std::collections::HashMap;

/// Metadata key whose presence marks an image as registry-managed
pub const MANAGED_IMAGE_KEY: &str = "AQ_OS";

/// Host profile carried on a managed image.
///
/// Present if and only if the image carries [`MANAGED_IMAGE_KEY`]; a VM built
/// from any other image is ignored entirely. Evaluated fresh on every event,
/// never cached across events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Operating system name (the `AQ_OS` value)
    pub os: String,
    /// Operating system version
    pub os_version: Option<String>,
    /// Registry archetype for host creation
    pub archetype: Option<String>,
    /// Registry personality for host creation
    pub personality: Option<String>,
    /// Registry configuration domain for manage/make
    pub domain: Option<String>,
}

impl ImageMetadata {
    /// Classify an image from its metadata map.
    ///
    /// Returns `None` when the managed-image key is absent, which means this
    /// VM is not ours to reconcile.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let os = metadata.get(MANAGED_IMAGE_KEY)?.clone();

        Some(Self {
            os,
            os_version: metadata.get("AQ_OSVERSION").cloned(),
            archetype: metadata.get("AQ_ARCHETYPE").cloned(),
            personality: metadata.get("AQ_PERSONALITY").cloned(),
            domain: metadata.get("AQ_DOMAIN").cloned(),
        })
    }
}
