pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;
pub mod path;
pub mod predict;
pub mod server;
pub mod service;
pub mod store;

pub use config::{AppConfig, ServerConfig};
pub use db::{DatabaseConfig, DatabaseEndpoint, WaypointDatabase};
pub use error::{WaypointError, WaypointResult};
pub use model::*;
pub use path::{PathAssembler, PathPolicy};
pub use predict::{ModelPredictor, WeaknessPredictor};
pub use service::{GeneratedPath, PathRequest, PathService, Resolution, ServiceContext};
