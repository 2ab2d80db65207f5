pub mod assignment_models;
pub mod detection_models;
pub mod hospital_models;
pub mod incident_models;
pub mod notification_models;
