pub mod contact;
pub mod dashboard;
pub mod deadline;
pub mod progress;
pub mod student;
pub mod workflows;
