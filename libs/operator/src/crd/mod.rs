pub mod cache;
pub mod cluster_template;
pub mod common;
pub mod model;
pub mod runtime_config;
pub mod template;

pub use cache::{AIMCache, AIMCacheSpec};
pub use cluster_template::{AIMClusterServiceTemplate, AIMClusterServiceTemplateSpec};
pub use model::{AIMModel, AIMModelSpec};
pub use runtime_config::{
    AIMClusterRuntimeConfig, AIMRuntimeConfig, ClusterRuntimeConfigSpec, EffectiveRuntimeConfig,
    RuntimeConfigSpec, StorageConfig,
};
pub use template::{AIMServiceTemplate, AIMServiceTemplateSpec};
