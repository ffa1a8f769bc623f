mod client;

pub use client::{MultipartUploadInfo, ObjectInfo, ObjectStoreClient, ObjectStoreConfig, PartInfo};
