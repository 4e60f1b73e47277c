use crate::application::use_cases::drone::DroneNavigator;
use actix_web::{dev::Server, post, web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

pub struct HttpState {
    pub navigator: Arc<DroneNavigator>,
}

#[derive(Debug, Deserialize)]
pub struct DroneRequest {
    pub instruction: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[post("/drones")]
async fn drones(data: web::Data<HttpState>, req: web::Json<DroneRequest>) -> impl Responder {
    match data.navigator.describe(&req.instruction).await {
        Ok(description) => HttpResponse::Ok().json(description),
        Err(e) => {
            error!(error = %e, "Drone instruction failed");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(drones);
}

pub fn start_server(navigator: Arc<DroneNavigator>, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(HttpState { navigator });

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run();

    info!(port, "App is running on http://localhost:{}", port);
    Ok(server)
}
