//! The user-facing HTML web server. Every route renders a page; question
//! answering is delegated to the shared [`Pipeline`].

use crate::config::{DemoSettings, Settings};
use crate::error::Error;
use crate::vqa::Pipeline;
use actix_multipart::form::MultipartFormConfig;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub mod pages;
mod protocol;
pub mod routes;

pub use pages::Pages;

#[derive(Debug)]
pub struct WebError {
    err: anyhow::Error,
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {:#}", self.err);
        } else {
            warn!("request rejected: {:#}", self.err);
        }

        HttpResponse::build(status)
            .insert_header(ContentType::html())
            .body(pages::error_page(&status.to_string(), &self.to_string()))
    }

    fn status_code(&self) -> StatusCode {
        match self.err.downcast_ref::<Error>() {
            Some(Error::MissingField(_)) => StatusCode::BAD_REQUEST,
            Some(Error::Network(_)) => StatusCode::BAD_GATEWAY,
            Some(Error::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Some(Error::Decode(_)) | Some(Error::Inference(_)) | None => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> WebError {
        WebError { err }
    }
}

impl From<Error> for WebError {
    fn from(err: Error) -> WebError {
        WebError { err: anyhow!(err) }
    }
}

impl From<handlebars::RenderError> for WebError {
    fn from(err: handlebars::RenderError) -> Self {
        WebError { err: anyhow!(err) }
    }
}

/// Everything the handlers share. Built once, before the server starts.
#[derive(Debug)]
pub struct ServerState {
    pipeline: Arc<Pipeline>,
    pages: Pages,
    http: reqwest::Client,
    demo: DemoSettings,
    max_fetch_bytes: usize,
    inference_timeout: Option<Duration>,
}

impl ServerState {
    pub fn new(settings: &Settings, pipeline: Arc<Pipeline>) -> anyhow::Result<Self> {
        let mut http = reqwest::Client::builder();
        if let Some(limit) = settings.demo.fetch_timeout() {
            http = http.timeout(limit);
        }

        Ok(ServerState {
            pipeline,
            pages: Pages::new().context("failed to compile page templates")?,
            http: http.build().context("failed to build HTTP client")?,
            demo: settings.demo.clone(),
            max_fetch_bytes: settings.max_upload_bytes,
            inference_timeout: settings.inference_timeout(),
        })
    }
}

/// Register the routes and the multipart limits on an `App`
pub fn configure(max_upload_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(
            MultipartFormConfig::default()
                .total_limit(max_upload_bytes)
                .memory_limit(max_upload_bytes),
        )
        .service(routes::index)
        .service(routes::upload)
        .service(routes::ask)
        .service(routes::demo);
    }
}

/// Bind the HTTP server. The returned future runs it until shutdown.
pub fn start(
    settings: &Settings,
    port: u16,
    pipeline: Pipeline,
) -> anyhow::Result<actix_web::dev::Server> {
    let state = web::Data::new(ServerState::new(settings, Arc::new(pipeline))?);
    let max_upload_bytes = settings.max_upload_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure(max_upload_bytes))
    })
    .bind((settings.host.as_str(), port))
    .with_context(|| format!("failed to bind {}:{port}", settings.host))?
    .run();

    info!("listening on http://{}:{port}", settings.host);
    Ok(server)
}
