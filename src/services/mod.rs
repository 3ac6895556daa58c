//! Application services. Each one holds the shared store handle and applies
//! validation, tenant scoping and logging around store calls.

pub mod appointments;
pub mod dashboard;
pub mod directory;

pub use appointments::{
    AppointmentDetail, AppointmentService, AppointmentView, NewAppointment, NewTreatment, PersonBrief,
};
pub use dashboard::{DashboardCounts, DashboardService, Period};
pub use directory::{DirectoryService, NewDoctor, NewPatient};
