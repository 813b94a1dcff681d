use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use mongodb::bson::oid::ObjectId;
use serde_json::{json, Value};

use config::Config;
use db::{FoodQuery, FoodSort, Store, StoreError};
use error::AppError;
use middleware::SessionGuard;
use models::{Food, FoodPatch, FoodRequest, SortParams, StatusUpdate};
use token::{SessionClaims, TokenService};

mod config;
mod db;
mod error;
#[cfg(test)]
mod memory;
mod middleware;
mod models;
mod token;

const DUPLICATE_REQUEST_MESSAGE: &str = "User has already requested this food item.";

fn parse_object_id(raw: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw).map_err(|_| AppError::BadRequest(format!("malformed identifier: {raw}")))
}

async fn index() -> impl Responder {
    HttpResponse::Ok().body("server is running")
}

async fn issue_token(tokens: web::Data<TokenService>, payload: web::Json<Value>) -> Result<HttpResponse, AppError> {
    let token = tokens.issue(payload.into_inner())?;
    Ok(HttpResponse::Ok()
        .cookie(tokens.cookie(token))
        .json(json!({ "success": true })))
}

async fn logout(tokens: web::Data<TokenService>) -> impl Responder {
    HttpResponse::Ok()
        .cookie(tokens.removal_cookie())
        .json(json!({ "success": true }))
}

async fn add_food(store: web::Data<dyn Store>, food: web::Json<Food>) -> Result<HttpResponse, AppError> {
    let result = store.insert_food(food.into_inner()).await?;
    log::info!("Food listed with id {}", result.inserted_id);
    Ok(HttpResponse::Ok().json(result))
}

async fn get_foods_by_owner(store: web::Data<dyn Store>, email: web::Path<String>) -> Result<HttpResponse, AppError> {
    let foods = store.find_foods(FoodQuery::owned_by(email.into_inner())).await?;
    Ok(HttpResponse::Ok().json(foods))
}

async fn get_foods(store: web::Data<dyn Store>) -> Result<HttpResponse, AppError> {
    let foods = store.find_foods(FoodQuery::all()).await?;
    Ok(HttpResponse::Ok().json(foods))
}

async fn sort_foods(store: web::Data<dyn Store>, params: web::Query<SortParams>) -> Result<HttpResponse, AppError> {
    let sort = FoodSort::from_query(params.sort_by.as_deref());
    log::debug!("Sorting foods by {:?} ({:?})", params.sort_by, sort);
    let foods = store.find_foods(FoodQuery::sorted(sort)).await?;
    Ok(HttpResponse::Ok().json(foods))
}

async fn featured_foods(store: web::Data<dyn Store>) -> Result<HttpResponse, AppError> {
    let foods = store.find_foods(FoodQuery::featured()).await?;
    Ok(HttpResponse::Ok().json(foods))
}

async fn get_food(store: web::Data<dyn Store>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let food = store.find_food(id).await?;
    Ok(HttpResponse::Ok().json(food))
}

async fn update_food(
    store: web::Data<dyn Store>,
    id: web::Path<String>,
    patch: web::Json<FoodPatch>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let patch = patch.into_inner();
    if patch.is_empty() {
        return Err(AppError::BadRequest("no updatable fields supplied".to_string()));
    }
    let result = store.update_food(id, patch).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn delete_food(store: web::Data<dyn Store>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let result = store.delete_food(id).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn add_request(
    store: web::Data<dyn Store>,
    session: web::ReqData<SessionClaims>,
    request: web::Json<FoodRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    let food_id = request.food_id.clone();

    match store.insert_request(request).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(StoreError::Duplicate) => {
            log::info!("Duplicate request for food {:?} from session {:?}", food_id, session.email());
            Err(AppError::Conflict(DUPLICATE_REQUEST_MESSAGE.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_requests_by_requester(
    store: web::Data<dyn Store>,
    email: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let requests = store.requests_by_requester(&email).await?;
    Ok(HttpResponse::Ok().json(requests))
}

async fn get_request_for_food(store: web::Data<dyn Store>, food_id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let request = store.request_for_food(&food_id).await?;
    Ok(HttpResponse::Ok().json(request))
}

async fn cancel_request(store: web::Data<dyn Store>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let result = store.delete_request(id).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn update_request_status(
    store: web::Data<dyn Store>,
    food_id: web::Path<String>,
    update: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
    let update = update.into_inner();
    let result = store.set_request_status(&food_id, update.status).await?;
    Ok(HttpResponse::Ok().json(result))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

/// Registers shared state and every route. Guarded routes carry a [`SessionGuard`];
/// everything else is public.
fn configure(cfg: &mut web::ServiceConfig, store: Arc<dyn Store>, tokens: Arc<TokenService>) {
    let guard = || SessionGuard::new(tokens.clone());

    cfg.app_data(web::Data::from(store))
        .app_data(web::Data::from(tokens.clone()))
        .app_data(json_config())
        .route("/", web::get().to(index))
        // session
        .route("/jwt", web::post().to(issue_token))
        .route("/logout", web::post().to(logout))
        // foods
        .route("/foods", web::post().to(add_food))
        .route("/foods", web::get().to(get_foods))
        .route("/foods/sort", web::get().to(sort_foods))
        .route("/featuredFood", web::get().to(featured_foods))
        .route("/manage/{email}", web::get().to(get_foods_by_owner))
        .route("/foods/{id}", web::get().to(get_food).wrap(guard()))
        .route("/foods/{id}", web::patch().to(update_food))
        .route("/foods/{id}", web::delete().to(delete_food))
        // requests
        .route("/requestedFood", web::post().to(add_request).wrap(guard()))
        .route("/requestedFoods/{email}", web::get().to(get_requests_by_requester).wrap(guard()))
        .route("/requestedFood/{id}", web::get().to(get_request_for_food))
        .route("/requestedFood/{id}", web::delete().to(cancel_request))
        .route("/requestedFoodItem/{foodId}", web::patch().to(update_request_status));
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(io::Error::other)?;

    let store = db::connect(&config).await.map_err(io::Error::other)?;
    store.ping().await.map_err(io::Error::other)?;
    log::info!("Pinged your deployment. Connected to MongoDB");

    // The duplicate-request conflict relies on this index.
    store.ensure_indexes().await.map_err(io::Error::other)?;

    let store: Arc<dyn Store> = Arc::new(store);
    let tokens = Arc::new(TokenService::new(&config.token_secret).secure_cookies(config.cookie_secure));
    let origin = config.client_origin.clone();

    log::info!("server is running on port: {}", config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&origin)
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .supports_credentials()
            .max_age(86400);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure(|cfg| configure(cfg, store.clone(), tokens.clone()))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
