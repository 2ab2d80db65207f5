pub mod detector;
pub mod dispatch;
pub mod matching;
pub mod tracking;
#[cfg(test)]
mod tests;

pub use detector::{SensorDetector, SensorMonitor};
pub use dispatch::DispatchService;
pub use matching::MatchingService;
pub use tracking::TrackingService;
