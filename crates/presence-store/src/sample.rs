//! Sample employees and cameras for demos and local testing.
//!
//! Each sample employee gets a one-hot embedding template, so a probe of
//! the same one-hot vector scores 1.0 against that employee and 0.0
//! against everyone else under the cosine scorer.

use crate::Store;
use presence_core::{Camera, Embedding, Employee, FaceTemplate, StoreError};

const TEMPLATE_DIM: usize = 8;

const EMPLOYEES: &[(&str, &str, &str, &str, &str)] = &[
    ("001", "Ahmad Wijaya", "ahmad@company.com", "Software Engineer", "IT"),
    ("002", "Siti Nurhaliza", "siti@company.com", "HR Manager", "HR"),
    ("003", "Budi Santoso", "budi@company.com", "Marketing Manager", "Marketing"),
    ("004", "Dewi Lestari", "dewi@company.com", "Finance Manager", "Finance"),
    ("005", "Rudi Hermawan", "rudi@company.com", "Operations Manager", "Operations"),
];

const CAMERAS: &[(&str, &str, &str, bool)] = &[
    ("cam-lobby", "Main Camera", "Main Lobby", true),
    ("cam-server", "Server Room Camera", "IT Server Room", true),
    ("cam-parking", "Parking Camera", "Parking Area", false),
];

/// One-hot embedding for the sample employee at `slot`, in wire form.
pub fn sample_template(slot: usize) -> String {
    let mut values = vec![0.0f32; TEMPLATE_DIM];
    values[slot % TEMPLATE_DIM] = 1.0;
    Embedding { values }.encode()
}

pub fn sample_employees() -> Vec<Employee> {
    EMPLOYEES
        .iter()
        .enumerate()
        .map(|(slot, (number, name, email, position, department))| Employee {
            id: format!("emp-{number}"),
            employee_number: number.to_string(),
            name: name.to_string(),
            email: Some(email.to_string()),
            position: Some(position.to_string()),
            department: Some(department.to_string()),
            active: true,
            template: Some(FaceTemplate(sample_template(slot))),
        })
        .collect()
}

pub fn sample_cameras() -> Vec<Camera> {
    CAMERAS
        .iter()
        .map(|(id, name, location, active)| Camera {
            id: id.to_string(),
            name: name.to_string(),
            location: Some(location.to_string()),
            active: *active,
        })
        .collect()
}

/// Upsert all sample rows. Returns (employees, cameras) written.
pub async fn seed(store: &Store) -> Result<(usize, usize), StoreError> {
    let employees = sample_employees();
    let cameras = sample_cameras();
    let counts = (employees.len(), cameras.len());

    for employee in employees {
        store.upsert_employee(employee).await?;
    }
    for camera in cameras {
        store.upsert_camera(camera).await?;
    }

    tracing::info!(employees = counts.0, cameras = counts.1, "sample data seeded");
    Ok(counts)
}
