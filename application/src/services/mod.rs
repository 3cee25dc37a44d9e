//! Resource services. Each owns the store of its own table and may hold
//! other tables' raw stores for read-only relationship resolution. A service
//! never depends on another service.

pub mod appointments;
pub mod catalog;
pub mod clients;
pub mod employees;
pub mod pets;

pub use appointments::{APPOINTMENTS, AppointmentService};
pub use catalog::{CATALOG, CatalogService};
pub use clients::{CLIENTS, ClientService};
pub use employees::{EMPLOYEES, EmployeeService};
pub use pets::{PETS, PetService};
