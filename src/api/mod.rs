pub mod attendance;
pub mod candidate;
pub mod dashboard;
pub mod department;
pub mod employee;
pub mod leave_request;
pub mod mail;
pub mod notification;
pub mod payroll;
pub mod project;
pub mod task;
pub mod upload;

use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;

/// `{ success: true, data }`
pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

/// `201 { success: true, message, data: { id } }`
pub fn created(message: &str, id: u64) -> HttpResponse {
    HttpResponse::Created().json(json!({
        "success": true,
        "message": message,
        "data": { "id": id }
    }))
}

/// `{ success: true, message }`
pub fn done(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}
