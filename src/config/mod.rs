pub mod environment;
pub mod initialization;

pub use environment::{get_environment, Environment, EnvironmentConfig};
pub use initialization::{
    initialize_application, initialize_logging, log_initialization_complete, InitializationResult,
};
