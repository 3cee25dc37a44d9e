use application::{
    APPOINTMENTS, AppointmentService, CATALOG, CLIENTS, CatalogService, ClientService, EMPLOYEES,
    EmployeeService, PETS, PetService, ResourceService,
};
use axum::{
    Router,
    routing::{get, post},
};
use infrastructure::{TableError, TableRegistry};
use std::sync::Arc;
use tracing::info;

pub mod config;
mod handlers;
mod response;

pub use config::AppConfig;
pub use response::map_application_error_to_response;

use handlers::{
    Resource, create_handler, delete_handler, get_handler, health_check, list_handler,
    search_handler, update_handler,
};

/// Every resource service exposed over HTTP.
#[derive(Clone)]
pub struct AppState {
    pub resources: Vec<Arc<dyn ResourceService>>,
}

impl AppState {
    /// Opens each table once and wires the services over the shared stores.
    /// Services only ever receive other tables' raw stores.
    pub async fn open(registry: &TableRegistry) -> Result<Self, TableError> {
        let clients = registry.open_resource(&CLIENTS).await?;
        let pets = registry.open_resource(&PETS).await?;
        let employees = registry.open_resource(&EMPLOYEES).await?;
        let services = registry.open_resource(&CATALOG).await?;
        let appointments = registry.open_resource(&APPOINTMENTS).await?;
        info!(data_dir = %registry.data_dir().display(), "Tables opened");

        let resources: Vec<Arc<dyn ResourceService>> = vec![
            Arc::new(ClientService::new(clients.clone(), pets.clone())),
            Arc::new(PetService::new(pets.clone(), clients)),
            Arc::new(EmployeeService::new(employees.clone())),
            Arc::new(CatalogService::new(services.clone())),
            Arc::new(AppointmentService::new(appointments, pets, services, employees)),
        ];
        info!("Application services initialized.");
        Ok(Self { resources })
    }
}

fn resource_routes(resource: Resource) -> Router {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/search", post(search_handler))
        .route(
            "/:id",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
        .with_state(resource)
}

/// `/health` plus, per resource, list/filter, get, create, update, delete and search.
pub fn build_router(state: AppState) -> Router {
    state.resources.into_iter().fold(
        Router::new().route("/health", get(health_check)),
        |app, resource| {
            let prefix = format!("/{}", resource.info().collection);
            info!(prefix = %prefix, "Mounting resource routes");
            app.nest(&prefix, resource_routes(resource))
        },
    )
}
