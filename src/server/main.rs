use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use clap::Parser;
use log::info;
use serde_json::{json, Value};
use std::sync::Arc;

mod tasks;

use tasks::TaskServer;

#[derive(Parser, Debug)]
#[command(author, version, about = "AARC to RC conversion job server", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    address: String,
    #[arg(short, long, default_value_t = 3005)]
    port: u16,
}

/// An `aarc` or `config` field may arrive as a nested object or as a string
/// holding JSON.
fn unwrap_json_field(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => Ok(other.clone()),
    }
}

async fn create_task(server: web::Data<TaskServer>, body: web::Bytes) -> HttpResponse {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::BadRequest().body(format!("Invalid JSON: {}", e));
        }
    };
    let Some(raw_aarc) = body.get("aarc") else {
        return HttpResponse::BadRequest().body("Invalid request: missing 'aarc'.");
    };
    let aarc = match unwrap_json_field(raw_aarc) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::BadRequest().body(format!("Invalid JSON format: {}", e));
        }
    };
    let config = match body.get("config") {
        Some(raw) => match unwrap_json_field(raw) {
            Ok(v) => v,
            Err(e) => {
                return HttpResponse::BadRequest().body(format!("Invalid JSON format: {}", e));
            }
        },
        None => Value::Null,
    };

    let key = server.submit(aarc, config);
    HttpResponse::Ok().json(json!({ "key": key, "status": "pending" }))
}

async fn get_task(server: web::Data<TaskServer>, body: web::Bytes) -> HttpResponse {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return HttpResponse::BadRequest().body(format!("Invalid JSON: {}", e));
        }
    };
    let Some(key) = body.get("key").and_then(Value::as_str) else {
        return HttpResponse::BadRequest().body("Invalid request: missing 'key'.");
    };
    match server.status_json(key) {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().body("Task not found."),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let server = TaskServer::new();

    {
        let worker = Arc::clone(&server);
        std::thread::spawn(move || worker.run_worker());
        let cleaner = Arc::clone(&server);
        std::thread::spawn(move || cleaner.run_cleanup());
    }

    let data = web::Data::from(Arc::clone(&server));
    info!("conversion server listening on {}:{}", args.address, args.port);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(data.clone())
            .route("/create", web::post().to(create_task))
            .route("/get", web::post().to(get_task))
    })
    .bind((args.address.as_str(), args.port))?
    .run()
    .await;

    server.shutdown();
    result
}
