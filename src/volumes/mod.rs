mod client;
mod model;

pub use client::VolumeCatalogClient;
pub use model::Volume;
