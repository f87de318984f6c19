//! Comprehensive tests for upload, replace, download and the two-store coordination

#[cfg(test)]
mod integration_tests {
    use bytes::Bytes;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::blob::mock_store::MockBlobStore;
    use crate::blob::{read_all, BlobStore};
    use crate::config::LimitsConfig;
    use crate::error::{FileStoreError, Result};
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::metadata::{new_id, FileUpdate, ListOptions, MetadataStore, NewFile};
    use crate::service::download::{collect, download, DownloadMessage};
    use crate::service::upload::{replace, upload, FileDescriptor, UploadMessage, UploadMode, UploadPhase, UploadSession};
    use crate::service::{FileService, Payload};

    fn fixture() -> (FileService, Arc<MockMetadataStore>, Arc<MockBlobStore>) {
        let metadata = Arc::new(MockMetadataStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let service = FileService::new(metadata.clone(), blobs.clone());
        (service, metadata, blobs)
    }

    fn descriptor(name: &str) -> UploadMessage {
        UploadMessage::Descriptor(FileDescriptor {
            name: name.to_string(),
            description: Some("a test file".to_string()),
            metadata: HashMap::from([("team".to_string(), "infra".to_string())]),
            ..Default::default()
        })
    }

    fn replace_descriptor(id: &str) -> FileDescriptor {
        FileDescriptor {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn messages(items: Vec<UploadMessage>) -> impl futures::Stream<Item = Result<UploadMessage>> {
        stream::iter(items.into_iter().map(Ok))
    }

    async fn upload_hello(service: &FileService) -> crate::metadata::FileRecord {
        upload(
            service,
            messages(vec![descriptor("hello.txt"), UploadMessage::data("hello", Some("text/plain"))]),
        )
        .await
        .expect("Upload failed")
    }

    #[tokio::test]
    async fn test_upload_then_get_resolves_payload() {
        let (service, _, blobs) = fixture();
        let record = upload(
            &service,
            messages(vec![
                descriptor("notes.md"),
                UploadMessage::data("ab", Some("text/markdown")),
                UploadMessage::data("cd", None),
                UploadMessage::data("ef", None),
            ]),
        )
        .await
        .expect("Upload failed");

        assert_eq!(record.name, "notes.md");
        assert_eq!(record.description, "a test file");
        assert!(record.has_blob());

        let fetched = service.get(&record.id).await.expect("Get failed");
        assert_eq!(fetched, record);

        let (info, data) = read_all(blobs.as_ref(), &fetched.blob_ref).await.unwrap();
        assert_eq!(data, b"abcdef");
        assert_eq!(info.content_type, "text/markdown");
        assert_eq!(info.file_id, record.id);
        assert_eq!(info.filename, "notes.md");
    }

    #[tokio::test]
    async fn test_upload_validation_errors_write_nothing() {
        let (service, metadata, blobs) = fixture();

        let err = upload(&service, messages(vec![descriptor("a.txt")])).await.unwrap_err();
        assert!(matches!(err, FileStoreError::MissingContent));

        let err = upload(
            &service,
            messages(vec![descriptor("a.txt"), UploadMessage::data("abc", None)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::MissingContentType));

        let err = upload(&service, messages(vec![UploadMessage::data("abc", Some("text/plain"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::MissingFile));

        let err = upload(&service, messages(vec![])).await.unwrap_err();
        assert!(matches!(err, FileStoreError::MissingFile));

        assert_eq!(metadata.record_count(), 0);
        assert_eq!(blobs.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_accepts_chunks_before_descriptor() {
        let (service, _, blobs) = fixture();
        let record = upload(
            &service,
            messages(vec![
                UploadMessage::data("early ", Some("text/plain")),
                descriptor("late.txt"),
                UploadMessage::data("bird", None),
            ]),
        )
        .await
        .unwrap();

        let (_, data) = read_all(blobs.as_ref(), &record.blob_ref).await.unwrap();
        assert_eq!(data, b"early bird");
        assert_eq!(record.name, "late.txt");
    }

    #[tokio::test]
    async fn test_resent_descriptor_and_content_type_latest_wins() {
        let (service, _, blobs) = fixture();
        let record = upload(
            &service,
            messages(vec![
                descriptor("first.txt"),
                UploadMessage::data("x", Some("text/plain")),
                descriptor("second.txt"),
                UploadMessage::data("y", Some("application/json")),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(record.name, "second.txt");
        let info = blobs.stat(&record.blob_ref).await.unwrap();
        assert_eq!(info.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_stream_error_fails_without_writes() {
        let (service, metadata, blobs) = fixture();
        let items: Vec<Result<UploadMessage>> = vec![
            Ok(descriptor("broken.txt")),
            Ok(UploadMessage::data("abc", Some("text/plain"))),
            Err(FileStoreError::Internal("Error reading stream: reset".to_string())),
        ];

        let mut session = UploadSession::new(&service, UploadMode::Create);
        let err = session.run(stream::iter(items)).await.unwrap_err();
        assert!(matches!(err, FileStoreError::Internal(_)));
        assert_eq!(session.phase(), UploadPhase::Failed);
        assert_eq!(metadata.record_count(), 0);
        assert_eq!(blobs.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_payload_limit_is_enforced_during_upload() {
        let (service, metadata, _) = fixture();
        let service = service.with_limits(LimitsConfig {
            max_payload_size: 4,
            ..Default::default()
        });

        let err = upload(
            &service,
            messages(vec![
                descriptor("big.bin"),
                UploadMessage::data("abc", Some("application/octet-stream")),
                UploadMessage::data("de", None),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::PayloadTooLarge { size: 5, limit: 4 }));
        assert_eq!(metadata.record_count(), 0);
    }

    #[tokio::test]
    async fn test_session_phases() {
        let (service, _, _) = fixture();
        let mut session = UploadSession::new(&service, UploadMode::Create);
        assert_eq!(session.phase(), UploadPhase::AwaitingDescriptor);

        session.handle(UploadMessage::data("a", Some("text/plain"))).unwrap();
        assert_eq!(session.phase(), UploadPhase::AwaitingDescriptor);

        session.handle(descriptor("a.txt")).unwrap();
        assert_eq!(session.phase(), UploadPhase::AccumulatingChunks);

        session.finalize().await.unwrap();
        assert_eq!(session.phase(), UploadPhase::Done);
    }

    #[tokio::test]
    async fn test_replace_without_content_updates_fields_only() {
        let (service, _, blobs) = fixture();
        let original = upload_hello(&service).await;

        let updated = replace(
            &service,
            messages(vec![UploadMessage::Descriptor(FileDescriptor {
                description: Some("updated".to_string()),
                ..replace_descriptor(&original.id)
            })]),
        )
        .await
        .expect("Replace failed");

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.name, "hello.txt");
        assert_eq!(updated.description, "updated");
        assert_eq!(updated.metadata, original.metadata);
        assert_eq!(updated.blob_ref, original.blob_ref);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(blobs.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_with_content_swaps_blob() {
        let (service, _, blobs) = fixture();
        let original = upload_hello(&service).await;

        let updated = replace(
            &service,
            messages(vec![
                UploadMessage::Descriptor(replace_descriptor(&original.id)),
                UploadMessage::data("goodbye", Some("text/plain")),
            ]),
        )
        .await
        .expect("Replace failed");

        assert_ne!(updated.blob_ref, original.blob_ref);
        assert!(!blobs.contains(&original.blob_ref));
        let (_, data) = read_all(blobs.as_ref(), &updated.blob_ref).await.unwrap();
        assert_eq!(data, b"goodbye");
        assert_eq!(blobs.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_link_failure_keeps_old_blob() {
        let (service, metadata, blobs) = fixture();
        let original = upload_hello(&service).await;

        metadata.set_fail_blob_link(true);
        let err = replace(
            &service,
            messages(vec![
                UploadMessage::Descriptor(FileDescriptor {
                    name: "renamed.txt".to_string(),
                    description: Some("changed".to_string()),
                    metadata: HashMap::from([("team".to_string(), "web".to_string())]),
                    ..replace_descriptor(&original.id)
                }),
                UploadMessage::data("goodbye", Some("text/plain")),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::Internal(_)));
        metadata.set_fail_blob_link(false);

        let record = service.get(&original.id).await.unwrap();
        assert_eq!(record.name, original.name);
        assert_eq!(record.description, original.description);
        assert_eq!(record.metadata, original.metadata);
        assert_eq!(record.blob_ref, original.blob_ref);
        let (_, data) = read_all(blobs.as_ref(), &record.blob_ref).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(blobs.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_field_update_failure_writes_no_blob() {
        let (service, metadata, blobs) = fixture();
        let original = upload_hello(&service).await;

        metadata.set_fail_updates(true);
        let err = replace(
            &service,
            messages(vec![
                UploadMessage::Descriptor(FileDescriptor {
                    name: "renamed.txt".to_string(),
                    ..replace_descriptor(&original.id)
                }),
                UploadMessage::data("goodbye", Some("text/plain")),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::Internal(_)));
        metadata.set_fail_updates(false);

        let record = service.get(&original.id).await.unwrap();
        assert_eq!(record.name, "hello.txt");
        assert_eq!(record.blob_ref, original.blob_ref);
        assert_eq!(blobs.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_old_blob_delete_failure_is_not_fatal() {
        let (service, _, blobs) = fixture();
        let original = upload_hello(&service).await;

        blobs.set_fail_deletes(true);
        let updated = replace(
            &service,
            messages(vec![
                UploadMessage::Descriptor(replace_descriptor(&original.id)),
                UploadMessage::data("goodbye", Some("text/plain")),
            ]),
        )
        .await
        .expect("Replace should succeed with an orphaned blob");

        assert_ne!(updated.blob_ref, original.blob_ref);
        assert!(blobs.contains(&original.blob_ref));
        assert_eq!(blobs.blob_count(), 2);
    }

    #[tokio::test]
    async fn test_replace_identifier_errors() {
        let (service, _, _) = fixture();

        let err = replace(&service, messages(vec![UploadMessage::Descriptor(replace_descriptor(""))]))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::IdentifierRequired));

        let err = replace(
            &service,
            messages(vec![UploadMessage::Descriptor(replace_descriptor("not-an-id"))]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::MalformedId(_)));

        let err = replace(
            &service,
            messages(vec![UploadMessage::Descriptor(replace_descriptor(&new_id()))]),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());

        let err = replace(&service, messages(vec![UploadMessage::data("x", Some("text/plain"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::MissingFile));
    }

    #[tokio::test]
    async fn test_replace_content_without_type_is_rejected_before_writes() {
        let (service, _, _) = fixture();
        let original = upload_hello(&service).await;

        let err = replace(
            &service,
            messages(vec![
                UploadMessage::Descriptor(FileDescriptor {
                    name: "renamed.txt".to_string(),
                    ..replace_descriptor(&original.id)
                }),
                UploadMessage::data("x", None),
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::MissingContentType));
        assert_eq!(service.get(&original.id).await.unwrap().name, "hello.txt");
    }

    #[tokio::test]
    async fn test_create_with_failing_link_removes_record() {
        let (service, metadata, blobs) = fixture();
        metadata.set_fail_blob_link(true);

        let err = upload(
            &service,
            messages(vec![descriptor("a.txt"), UploadMessage::data("abc", Some("text/plain"))]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileStoreError::Internal(_)));
        assert_eq!(metadata.record_count(), 0);
        assert_eq!(blobs.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_create_with_failing_blob_write_removes_record() {
        let (service, metadata, blobs) = fixture();
        blobs.set_fail_writes(true);

        let err = service
            .create(
                NewFile { name: "a.txt".to_string(), ..Default::default() },
                Some(Payload::new("abc", "text/plain")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Internal(_)));
        assert_eq!(metadata.record_count(), 0);
    }

    #[tokio::test]
    async fn test_create_without_payload_and_name_validation() {
        let (service, _, _) = fixture();
        let record = service
            .create(NewFile { name: "empty.txt".to_string(), ..Default::default() }, None)
            .await
            .unwrap();
        assert!(!record.has_blob());

        let err = service.create(NewFile::default(), None).await.unwrap_err();
        assert!(matches!(err, FileStoreError::InvalidArgument(_)));

        let err = service
            .update(
                &record.id,
                FileUpdate { name: Some(" ".to_string()), ..Default::default() },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_cannot_relink_blob_directly() {
        let (service, _, _) = fixture();
        let original = upload_hello(&service).await;

        let updated = service
            .update(&original.id, FileUpdate::link_blob(new_id()), None)
            .await
            .unwrap();
        assert_eq!(updated.blob_ref, original.blob_ref);
    }

    #[tokio::test]
    async fn test_download_streams_content_type_then_chunks() {
        let (service, _, _) = fixture();
        let payload: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
        let record = service
            .create(
                NewFile { name: "big.bin".to_string(), ..Default::default() },
                Some(Payload::new(payload.clone(), "application/octet-stream")),
            )
            .await
            .unwrap();

        let mut stream = download(&service, &record.id).await.unwrap();
        let mut received = Vec::new();
        while let Some(message) = futures::StreamExt::next(&mut stream).await {
            received.push(message.unwrap());
        }

        assert_eq!(
            received[0],
            DownloadMessage::ContentType("application/octet-stream".to_string())
        );
        let sizes: Vec<usize> = received[1..]
            .iter()
            .map(|m| match m {
                DownloadMessage::Chunk(chunk) => chunk.len(),
                DownloadMessage::ContentType(_) => panic!("content type sent twice"),
            })
            .collect();
        assert_eq!(sizes, vec![65536, 65536, 22528]);

        let data: Vec<u8> = received[1..]
            .iter()
            .flat_map(|m| match m {
                DownloadMessage::Chunk(chunk) => chunk.to_vec(),
                DownloadMessage::ContentType(_) => Vec::new(),
            })
            .collect();
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn test_download_uses_configured_chunk_size() {
        let (service, _, _) = fixture();
        let service = service.with_limits(LimitsConfig {
            download_chunk_size: 2,
            ..Default::default()
        });
        let record = upload_hello(&service).await;

        let stream = download(&service, &record.id).await.unwrap();
        let (content_type, data) = collect(stream).await.unwrap();
        assert_eq!(content_type, "text/plain");
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_download_not_found_cases() {
        let (service, _, blobs) = fixture();

        let err = download(&service, &new_id()).await.unwrap_err();
        assert!(err.is_not_found());

        let empty = service
            .create(NewFile { name: "empty.txt".to_string(), ..Default::default() }, None)
            .await
            .unwrap();
        let err = download(&service, &empty.id).await.unwrap_err();
        assert!(err.is_not_found());

        let record = upload_hello(&service).await;
        blobs.set_fail_reads(true);
        let err = download(&service, &record.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_blob() {
        let (service, metadata, blobs) = fixture();
        let record = upload_hello(&service).await;

        service.delete(&record.id).await.expect("Delete failed");
        assert!(service.get(&record.id).await.unwrap_err().is_not_found());
        assert!(!blobs.contains(&record.blob_ref));
        assert_eq!(metadata.record_count(), 0);

        assert!(service.delete(&record.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_tolerates_blob_failure() {
        let (service, metadata, blobs) = fixture();
        let record = upload_hello(&service).await;

        blobs.set_fail_deletes(true);
        service.delete(&record.id).await.expect("Delete should succeed");
        assert_eq!(metadata.record_count(), 0);
        assert!(blobs.contains(&record.blob_ref));
    }

    #[tokio::test]
    async fn test_delete_keeps_blob_when_record_delete_fails() {
        let (service, metadata, blobs) = fixture();
        let record = upload_hello(&service).await;

        metadata.set_fail_deletes(true);
        assert!(service.delete(&record.id).await.is_err());
        assert!(blobs.contains(&record.blob_ref));
        assert!(service.get(&record.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_content_detects_corruption() {
        let (service, _, blobs) = fixture();
        let record = upload_hello(&service).await;

        assert!(service.verify_content(&record.id).await.unwrap());
        blobs.corrupt(&record.blob_ref, b"jello");
        assert!(!service.verify_content(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_metadata() {
        let (service, metadata, _) = fixture();
        upload_hello(&service).await;
        metadata
            .insert(&NewFile {
                name: "other.txt".to_string(),
                metadata: HashMap::from([("team".to_string(), "web".to_string())]),
                ..Default::default()
            })
            .await
            .unwrap();

        let all = service.list(&HashMap::new(), &ListOptions::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filter = HashMap::from([("team".to_string(), "infra".to_string())]);
        let infra = service.list(&filter, &ListOptions::default()).await.unwrap();
        assert_eq!(infra.len(), 1);
        assert_eq!(infra[0].name, "hello.txt");

        let paged = service
            .list(&HashMap::new(), &ListOptions { limit: 1, page: 1, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_filter_keys_outside_alphabet() {
        let (service, _, _) = fixture();
        upload_hello(&service).await;

        let filter = HashMap::from([("te\\am".to_string(), "infra".to_string())]);
        let err = service.list(&filter, &ListOptions::default()).await.unwrap_err();
        assert!(matches!(err, FileStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_with_huge_page_is_empty() {
        let (service, _, _) = fixture();
        upload_hello(&service).await;

        let options = ListOptions { limit: i64::MAX, page: 2, ..Default::default() };
        let records = service.list(&HashMap::new(), &options).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_blob_written_through_service_matches_checksum() {
        let (service, _, blobs) = fixture();
        let record = service
            .create(
                NewFile { name: "c.txt".to_string(), ..Default::default() },
                Some(Payload::new(Bytes::from_static(b"checksum me"), "text/plain")),
            )
            .await
            .unwrap();
        let info = blobs.stat(&record.blob_ref).await.unwrap();
        assert_eq!(info.md5, crate::blob::checksum(b"checksum me"));
        assert_eq!(info.length, 11);
    }
}
