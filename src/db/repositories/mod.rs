use std::sync::Arc;

use crate::db::document::DocumentStore;

pub mod assignments;
pub mod detections;
pub mod hospital_responses;
pub mod hospitals;
pub mod incidents;
pub mod notifications;

pub use assignments::AssignmentsRepository;
pub use detections::DetectionsRepository;
pub use hospital_responses::HospitalResponsesRepository;
pub use hospitals::HospitalsRepository;
pub use incidents::IncidentsRepository;
pub use notifications::NotificationsRepository;

/// All repositories over one shared store handle
#[derive(Clone)]
pub struct Repositories {
    pub incidents: IncidentsRepository,
    pub hospitals: HospitalsRepository,
    pub hospital_responses: HospitalResponsesRepository,
    pub assignments: AssignmentsRepository,
    pub detections: DetectionsRepository,
    pub notifications: NotificationsRepository,
}

impl Repositories {
    /// Create the full repository set
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            incidents: IncidentsRepository::new(store.clone()),
            hospitals: HospitalsRepository::new(store.clone()),
            hospital_responses: HospitalResponsesRepository::new(store.clone()),
            assignments: AssignmentsRepository::new(store.clone()),
            detections: DetectionsRepository::new(store.clone()),
            notifications: NotificationsRepository::new(store),
        }
    }
}
