pub mod application_service;
pub mod co_applicant_records;
pub mod crm_service;
pub mod participant_registry;
pub mod participant_sync;
pub mod token_vault;
