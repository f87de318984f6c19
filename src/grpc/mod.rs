//! gRPC File Storage Service Implementation
//!
//! Thin adapter between the generated `filestorage` types and the
//! [`FileService`] orchestrators. Each RPC converts its request, calls the
//! service and maps [`FileStoreError`] onto a `tonic::Status`.

pub mod pb {
    tonic::include_proto!("filestorage");
}

use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};

use crate::error::{FileStoreError, Result};
use crate::metadata::{FileRecord, ListOptions, SortDirection};
use crate::service::{download, replace, upload, DownloadMessage, FileDescriptor, FileService, UploadMessage};

use pb::file_storage_server::{FileStorage, FileStorageServer};
use pb::{download_response, upload_request};

pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = std::result::Result<T, Status>> + Send>>;

impl From<FileRecord> for pb::File {
    fn from(record: FileRecord) -> Self {
        pb::File {
            id: record.id,
            name: record.name,
            description: record.description,
            metadata: record.metadata,
            blob_ref: record.blob_ref,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

impl From<pb::FileDescriptor> for FileDescriptor {
    fn from(file: pb::FileDescriptor) -> Self {
        FileDescriptor {
            id: file.id,
            name: file.name,
            description: file.description,
            metadata: file.metadata,
        }
    }
}

impl From<DownloadMessage> for pb::DownloadResponse {
    fn from(message: DownloadMessage) -> Self {
        let data = match message {
            DownloadMessage::ContentType(content_type) => download_response::Data::ContentType(content_type),
            DownloadMessage::Chunk(chunk) => download_response::Data::Chunk(chunk.to_vec()),
        };
        pb::DownloadResponse { data: Some(data) }
    }
}

/// Convert one inbound upload message; a message with neither field set is skipped
fn upload_message(request: pb::UploadRequest) -> Option<UploadMessage> {
    match request.request? {
        upload_request::Request::File(file) => Some(UploadMessage::Descriptor(file.into())),
        upload_request::Request::Data(data) => {
            let content_type = Some(data.content_type).filter(|ct| !ct.is_empty());
            Some(UploadMessage::Data {
                chunk: data.chunk.into(),
                content_type,
            })
        }
    }
}

/// Adapt an inbound gRPC stream into upload messages
pub fn upload_messages<S>(requests: S) -> impl Stream<Item = Result<UploadMessage>>
where
    S: Stream<Item = std::result::Result<pb::UploadRequest, Status>>,
{
    requests.filter_map(|request| async move {
        match request {
            Ok(request) => upload_message(request).map(Ok),
            Err(status) => Some(Err(FileStoreError::Internal(format!(
                "Error reading stream: {}",
                status.message()
            )))),
        }
    })
}

fn list_options(request: &pb::FindRequest) -> Result<ListOptions> {
    let mut options = ListOptions {
        limit: request.limit,
        page: request.page,
        ..Default::default()
    };
    if !request.order_by.is_empty() {
        options.order_by = request.order_by.parse()?;
    }
    if request.ascending {
        options.direction = SortDirection::Ascending;
    }
    Ok(options)
}

/// gRPC service implementation backed by a [`FileService`]
#[derive(Clone)]
pub struct FileStorageService {
    service: Arc<FileService>,
}

impl FileStorageService {
    pub fn new(service: Arc<FileService>) -> Self {
        Self { service }
    }

    /// Wrap into the generated tonic server
    pub fn into_server(self) -> FileStorageServer<Self> {
        FileStorageServer::new(self)
    }
}

#[tonic::async_trait]
impl FileStorage for FileStorageService {
    type FindStream = ResponseStream<pb::File>;
    type DownloadStream = ResponseStream<pb::DownloadResponse>;

    async fn find(&self, request: Request<pb::FindRequest>) -> std::result::Result<Response<Self::FindStream>, Status> {
        let request = request.into_inner();
        let options = list_options(&request)?;
        let records = self.service.list(&request.metadata, &options).await?;
        debug!("Find matched {} files", records.len());

        let stream = futures::stream::iter(records.into_iter().map(|record| Ok(pb::File::from(record))));
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get(&self, request: Request<pb::GetRequest>) -> std::result::Result<Response<pb::File>, Status> {
        let record = self.service.get(&request.into_inner().id).await?;
        Ok(Response::new(record.into()))
    }

    async fn upload(
        &self,
        request: Request<Streaming<pb::UploadRequest>>,
    ) -> std::result::Result<Response<pb::File>, Status> {
        let record = upload(&self.service, upload_messages(request.into_inner()))
            .await
            .map_err(|e| {
                warn!("Upload failed: {}", e);
                Status::from(e)
            })?;
        Ok(Response::new(record.into()))
    }

    async fn replace(
        &self,
        request: Request<Streaming<pb::UploadRequest>>,
    ) -> std::result::Result<Response<pb::File>, Status> {
        let record = replace(&self.service, upload_messages(request.into_inner()))
            .await
            .map_err(|e| {
                warn!("Replace failed: {}", e);
                Status::from(e)
            })?;
        Ok(Response::new(record.into()))
    }

    async fn delete(
        &self,
        request: Request<pb::DeleteRequest>,
    ) -> std::result::Result<Response<pb::DeleteResponse>, Status> {
        self.service.delete(&request.into_inner().id).await?;
        Ok(Response::new(pb::DeleteResponse {}))
    }

    async fn download(
        &self,
        request: Request<pb::DownloadRequest>,
    ) -> std::result::Result<Response<Self::DownloadStream>, Status> {
        let stream = download(&self.service, &request.into_inner().id).await?;
        let stream = stream.map(|message| message.map(pb::DownloadResponse::from).map_err(Status::from));
        Ok(Response::new(Box::pin(stream)))
    }
}
