pub mod campaigns;
pub mod contacts;
pub mod dashboard;
pub mod delivery;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod templates;
