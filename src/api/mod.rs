//! JSON/HTTP surface
//!
//! CRUD on file records plus whole-payload attach and fetch. Uploaded bodies
//! go through the same accumulator as gRPC uploads, so the payload ceiling is
//! identical on both transports.

use actix_web::http::header::CONTENT_TYPE;
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use futures::StreamExt;
use log::{debug, info};
use serde_json::json;
use std::collections::HashMap;

use crate::app_state::AppState;
use crate::error::{FileStoreError, Result};
use crate::metadata::{FileUpdate, ListOptions, NewFile, SortDirection};
use crate::service::{download, ChunkAccumulator, DownloadMessage};

const METADATA_PREFIX: &str = "metadata.";

/// Register every route on an actix app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_files)
        .service(create_file)
        .service(get_file)
        .service(update_file)
        .service(delete_file)
        .service(put_content)
        .service(get_content)
        .service(verify_content);
}

/// Split a query string into a metadata filter and listing options.
///
/// Keys of the form `metadata.<key>` filter on tags; `limit`, `page`,
/// `order_by` and `direction` control paging and ordering.
fn list_params(query: HashMap<String, String>) -> Result<(HashMap<String, String>, ListOptions)> {
    let mut filter = HashMap::new();
    let mut options = ListOptions::default();

    for (key, value) in query {
        match key.as_str() {
            "limit" => options.limit = parse_number(&key, &value)?,
            "page" => options.page = parse_number(&key, &value)?,
            "order_by" => options.order_by = value.parse()?,
            "direction" => {
                options.direction = match value.to_lowercase().as_str() {
                    "asc" | "ascending" => SortDirection::Ascending,
                    "desc" | "descending" => SortDirection::Descending,
                    _ => {
                        return Err(FileStoreError::InvalidArgument(format!(
                            "Unknown sort direction: {}",
                            value
                        )))
                    }
                }
            }
            _ => match key.strip_prefix(METADATA_PREFIX) {
                Some(tag) if !tag.is_empty() => {
                    filter.insert(tag.to_string(), value);
                }
                _ => debug!("Ignoring unknown query parameter {}", key),
            },
        }
    }
    Ok((filter, options))
}

fn parse_number(key: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| FileStoreError::InvalidArgument(format!("{} must be an integer, got {:?}", key, value)))
}

#[get("/files")]
async fn list_files(query: web::Query<HashMap<String, String>>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (filter, options) = list_params(query.into_inner())?;
    let records = state.file_service.list(&filter, &options).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[post("/file")]
async fn create_file(file: web::Json<NewFile>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let record = state.file_service.create(file.into_inner(), None).await?;
    log_mdc::insert("file_id", &record.id);
    info!("Created file {} over HTTP", record.id);
    Ok(HttpResponse::Ok().json(record))
}

#[get("/file/{id}")]
async fn get_file(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    let record = state.file_service.get(&id).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[put("/file/{id}")]
async fn update_file(
    id: web::Path<String>,
    update: web::Json<FileUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    let record = state.file_service.update(&id, update.into_inner(), None).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[delete("/file/{id}")]
async fn delete_file(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    state.file_service.delete(&id).await?;
    Ok(HttpResponse::Ok().finish())
}

#[put("/file/{id}/content")]
async fn put_content(
    id: web::Path<String>,
    mut payload: web::Payload,
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    let content_type = req.headers().get(CONTENT_TYPE).and_then(|h| h.to_str().ok());

    let mut accumulator = ChunkAccumulator::with_limit(state.file_service.limits().max_payload_size);
    accumulator.write(&[], content_type)?;
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| FileStoreError::Internal(format!("Error reading stream: {}", e)))?;
        accumulator.write(&chunk, None)?;
    }

    if accumulator.is_empty() {
        return Err(FileStoreError::MissingContent);
    }
    if accumulator.content_type().is_none() {
        return Err(FileStoreError::MissingContentType);
    }
    debug!("Received {} bytes of content for file {}", accumulator.len(), id);

    let record = state
        .file_service
        .update(&id, FileUpdate::default(), Some(accumulator.take_payload()))
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

#[get("/file/{id}/content")]
async fn get_content(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    let mut stream = download(&state.file_service, &id).await?;

    let content_type = match stream.next().await {
        Some(Ok(DownloadMessage::ContentType(content_type))) => content_type,
        Some(Err(e)) => return Err(e),
        _ => return Err(FileStoreError::Internal("Download did not start with a content type".to_string())),
    };

    let body = stream.filter_map(|message| async move {
        match message {
            Ok(DownloadMessage::Chunk(chunk)) => Some(Ok(chunk)),
            Ok(DownloadMessage::ContentType(_)) => None,
            Err(e) => Some(Err(e)),
        }
    });
    Ok(HttpResponse::Ok().content_type(content_type).streaming(body))
}

#[get("/file/{id}/verify")]
async fn verify_content(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    log_mdc::insert("file_id", id.as_str());
    let intact = state.file_service.verify_content(&id).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": id.as_str(), "intact": intact })))
}
