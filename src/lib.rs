pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod messaging;
pub mod services;

// Re-export main components for easier use
pub use error::Error;
pub use geo::Coordinate;
pub use services::{
    DispatchService,
    MatchingService,
    SensorDetector,
    SensorMonitor,
    TrackingService,
};
