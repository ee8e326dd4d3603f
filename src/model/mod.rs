pub mod attendance;
pub mod candidate;
pub mod department;
pub mod employee;
pub mod leave_request;
pub mod mail;
pub mod notification;
pub mod payroll;
pub mod project;
pub mod role;
pub mod task;
