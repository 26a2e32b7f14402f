#![allow(async_fn_in_trait)]

mod config;
mod context;
mod core;
mod database;
mod error;
mod handlers;
mod impls;
mod middlewares;
mod request;
mod response;
mod routes;

use std::sync::Arc;

use actix_files::Files;
use actix_web::web::Data;
use actix_web::HttpServer;
use log::info;
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;

use crate::config::Config;
use crate::core::freshness::{spawn_refresh, Refresher};
use crate::core::resilience::Resilience;
use crate::core::services::poll::try_public_polls;
use crate::database::sqlx::PgSqlx;
use crate::error::Error;
use crate::handlers::poll::Feed;
use crate::impls::completers::openai::OpenAi;
use crate::impls::tokener::jwt::JWT;
use crate::impls::uploaders::local_storage::{LocalStorage, PUBLIC_PREFIX};
use crate::middlewares::jwt::JWTMiddleware;

const MIGRATION: &str = include_str!("../migrations/0001_init.sql");

#[actix_web::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    if config.run_migrations {
        info!("applying database schema");
        pool.execute(MIGRATION).await?;
    }
    let store = PgSqlx::new(pool);
    let res = Data::new(Resilience::with_timeout(config.request_timeout));
    let uploader = Data::new(LocalStorage::new(&config.upload_path, &config.public_base_url)?);
    let completer = Data::new(config.openai_api_key.clone().map(|key| OpenAi::new(reqwest::Client::new(), key, config.openai_model.clone())));
    if completer.is_none() {
        info!("OPENAI_API_KEY not set, poll content generation uses the local fallback");
    }

    let feed: Arc<Feed> = Arc::new(Refresher::new());
    let refresh = {
        let (store, res) = (store.clone(), res.clone());
        spawn_refresh(feed.clone(), config.refresh_interval, move || {
            let (store, res) = (store.clone(), res.clone());
            async move { try_public_polls(&store, &res).await }
        })
    };
    let feed = Data::from(feed);

    let secret = config.jwt_secret.clone().into_bytes();
    let upload_path = config.upload_path.clone();
    info!("listening on {}", config.bind_address);
    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(JWTMiddleware::new(secret.clone()))
            .wrap(actix_web::middleware::Logger::default())
            .app_data(Data::new(store.clone()))
            .app_data(res.clone())
            .app_data(Data::new(JWT::new(&secret)))
            .app_data(uploader.clone())
            .app_data(completer.clone())
            .app_data(feed.clone())
            .service(Files::new(PUBLIC_PREFIX, &upload_path))
            .configure(routes::configure::<PgSqlx, LocalStorage, OpenAi>)
    })
    .bind(&config.bind_address)?
    .run()
    .await?;

    refresh.stop();
    Ok(())
}
