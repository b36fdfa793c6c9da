pub mod gpa;
pub mod grades;
pub mod session;
pub mod status;
