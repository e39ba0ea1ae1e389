pub mod applicant;
pub mod application;
pub mod document;
pub mod job;
