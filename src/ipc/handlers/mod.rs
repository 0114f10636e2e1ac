pub mod assessments;
pub mod core;
pub mod grades;
pub mod policy;
pub mod reports;
pub mod rubric;
pub mod scoring;
