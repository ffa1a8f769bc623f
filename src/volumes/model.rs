use serde::{Deserialize, Serialize};

/// A network volume: a named, sized, datacenter-bound storage container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub size: u32,
    #[serde(rename = "dataCenterId")]
    pub datacenter_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateVolumeBody {
    pub name: String,
    pub size: u32,
    #[serde(rename = "dataCenterId")]
    pub datacenter_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateVolumeBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}
