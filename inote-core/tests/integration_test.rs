//! Integration tests for inote-core
//!
//! These tests verify end-to-end functionality including:
//! - Folder and note workflows through the repositories
//! - Full-text search and index consistency
//! - Attachment cascades onto the file store
//! - Recovery from a corrupted store file
//! - Backup export and import

use inote_core::config::StoreConfig;
use inote_core::database::{
    AttachmentKind, ConnectionState, CreateAttachmentRequest, CreateFolderRequest,
    CreateNoteRequest, UpdateNoteRequest,
};
use inote_core::AppContext;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinSet;

/// Helper to create an application context in a fresh data directory
async fn create_test_context() -> (AppContext, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = open_context(&temp_dir).await;
    (ctx, temp_dir)
}

async fn open_context(temp_dir: &TempDir) -> AppContext {
    let config = StoreConfig::in_data_dir(temp_dir.path())
        .with_recovery_delays(Duration::from_millis(5), Duration::from_millis(5));
    AppContext::with_config(temp_dir.path(), config).await.unwrap()
}

async fn assert_search_index_consistent(ctx: &AppContext) {
    // A failed check reports corruption, which would otherwise be healed
    // silently by a rebuild
    let recoveries = ctx.manager().recovery_count();
    ctx.database
        .execute(
            "INSERT INTO NotesSearch(NotesSearch) VALUES('integrity-check')",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(ctx.manager().recovery_count(), recoveries);
}

#[tokio::test]
async fn test_folder_and_note_workflow() {
    let (ctx, _temp) = create_test_context().await;

    // Nothing is opened until the first statement
    assert_eq!(ctx.manager().state(), ConnectionState::Uninitialized);

    let folder = ctx
        .folders
        .create(CreateFolderRequest {
            name: "Work".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let note = ctx
        .notes
        .create(CreateNoteRequest {
            folder_id: Some(folder.id.clone()),
            title: Some("Todo".to_string()),
            body_rich_html: Some("<p>ship it</p>".to_string()),
            plain_text_preview: Some("ship it".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut req = UpdateNoteRequest::new(&note.id);
    req.pinned = Some(true);
    let pinned = ctx.notes.update(req).await.unwrap();

    let all = ctx.notes.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].pinned);
    assert!(pinned.updated_at > pinned.created_at);

    let found = ctx.notes.search("tod").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, note.id);

    assert_eq!(ctx.manager().state(), ConnectionState::Ready);
    assert_search_index_consistent(&ctx).await;
}

#[tokio::test]
async fn test_locked_note_preview_is_never_stored() {
    let (ctx, _temp) = create_test_context().await;

    let note = ctx
        .notes
        .create(CreateNoteRequest {
            title: Some("Journal".to_string()),
            plain_text_preview: Some("secret stuff".to_string()),
            is_locked: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let stored = ctx.notes.get(&note.id).await.unwrap();
    assert_eq!(stored.plain_text_preview.as_deref(), Some(""));

    // The hidden text is not searchable either
    assert!(ctx.notes.search("secret").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_with_only_special_characters_lists_everything() {
    let (ctx, _temp) = create_test_context().await;

    let plain = ctx
        .notes
        .create(CreateNoteRequest {
            title: Some("Plain".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let starred = ctx
        .notes
        .create(CreateNoteRequest {
            title: Some("Starred".to_string()),
            pinned: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let results = ctx.notes.search("***").await.unwrap();
    let ids: Vec<String> = results.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![starred.id, plain.id]);
}

#[tokio::test]
async fn test_deleting_folder_unfiles_its_notes() {
    let (ctx, _temp) = create_test_context().await;

    let folder = ctx
        .folders
        .create(CreateFolderRequest {
            name: "Archive".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let note = ctx
        .notes
        .create(CreateNoteRequest {
            folder_id: Some(folder.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    ctx.folders.delete(&folder.id).await.unwrap();

    let note = ctx.notes.get(&note.id).await.unwrap();
    assert!(note.folder_id.is_none());
    assert_eq!(ctx.notes.get_by_folder(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleting_note_removes_attachments_and_files() {
    let (ctx, temp) = create_test_context().await;

    let note = ctx.notes.create(CreateNoteRequest::default()).await.unwrap();

    let source = temp.path().join("receipt.pdf");
    std::fs::write(&source, b"%PDF-1.4 receipt").unwrap();

    let attachment = ctx
        .attachments_service
        .add_attachment(&note.id, &source, None)
        .await
        .unwrap();
    assert!(std::path::Path::new(&attachment.uri).exists());

    ctx.notes.delete(&note.id).await.unwrap();

    assert!(ctx.attachments.get_by_note_id(&note.id).await.unwrap().is_empty());
    assert!(!std::path::Path::new(&attachment.uri).exists());
}

#[tokio::test]
async fn test_deleting_note_never_touches_files_outside_the_store() {
    let (ctx, temp) = create_test_context().await;

    let note = ctx.notes.create(CreateNoteRequest::default()).await.unwrap();

    // A row pointing outside the attachments directory, as an imported
    // backup could carry
    let outside = temp.path().join("important.txt");
    std::fs::write(&outside, b"keep me").unwrap();
    ctx.attachments
        .create(CreateAttachmentRequest {
            note_id: note.id.clone(),
            kind: AttachmentKind::File,
            uri: outside.to_string_lossy().into_owned(),
            name: Some("important.txt".to_string()),
            mime_type: None,
            file_size: None,
            thumbnail_uri: None,
        })
        .await
        .unwrap();

    ctx.notes.delete(&note.id).await.unwrap();

    assert!(ctx.attachments.get_by_note_id(&note.id).await.unwrap().is_empty());
    assert!(outside.exists());
}

#[tokio::test]
async fn test_index_stays_consistent_across_writes() {
    let (ctx, _temp) = create_test_context().await;

    let mut ids = Vec::new();
    for i in 0..10 {
        let note = ctx
            .notes
            .create(CreateNoteRequest {
                title: Some(format!("Note {}", i)),
                plain_text_preview: Some(format!("body {}", i)),
                ..Default::default()
            })
            .await
            .unwrap();
        ids.push(note.id);
    }

    for id in ids.iter().step_by(2) {
        let mut req = UpdateNoteRequest::new(id);
        req.title = Some("Renamed".to_string());
        ctx.notes.update(req).await.unwrap();
    }

    for id in ids.iter().skip(1).step_by(3) {
        ctx.notes.delete(id).await.unwrap();
    }

    assert_search_index_consistent(&ctx).await;

    let renamed = ctx.notes.search("renamed").await.unwrap();
    let live = ctx.notes.get_all().await.unwrap();
    let expected = live
        .iter()
        .filter(|n| n.title.as_deref() == Some("Renamed"))
        .count();
    assert_eq!(renamed.len(), expected);
}

#[tokio::test]
async fn test_concurrent_first_use_opens_store_once() {
    let (ctx, _temp) = create_test_context().await;

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let ctx = ctx.clone();
        tasks.spawn(async move {
            ctx.notes
                .create(CreateNoteRequest {
                    title: Some(format!("Parallel {}", i)),
                    ..Default::default()
                })
                .await
                .unwrap();
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(ctx.manager().open_count(), 1);
    assert_eq!(ctx.notes.get_all().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_corrupted_store_is_rebuilt_on_next_use() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = open_context(&temp_dir).await;

    ctx.notes
        .create(CreateNoteRequest {
            title: Some("Lost".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    ctx.shutdown().await;

    // Overwrite the store with garbage while no handle is open
    std::fs::write(ctx.manager().path(), vec![0xAB; 8192]).unwrap();

    let note = ctx
        .notes
        .create(CreateNoteRequest {
            title: Some("Fresh".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(ctx.manager().recovery_count(), 1);
    assert_eq!(ctx.manager().state(), ConnectionState::Ready);

    let all = ctx.notes.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, note.id);
    assert_search_index_consistent(&ctx).await;
}

#[tokio::test]
async fn test_backup_round_trip_between_contexts() {
    let (source, _source_temp) = create_test_context().await;

    let folder = source
        .folders
        .create(CreateFolderRequest {
            name: "Recipes".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    source
        .notes
        .create(CreateNoteRequest {
            folder_id: Some(folder.id),
            title: Some("Pancakes".to_string()),
            plain_text_preview: Some("flour eggs milk".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let archive = source.backup.export_backup().await.unwrap();
    assert_eq!(source.backup.list_backups().await.unwrap().len(), 1);

    let (target, _target_temp) = create_test_context().await;
    let summary = target.backup.import_backup(&archive).await.unwrap();

    assert_eq!(summary.folders.imported, 1);
    assert_eq!(summary.notes.imported, 1);
    assert_eq!(summary.notes.failed, 0);

    let found = target.notes.search("pan").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title.as_deref(), Some("Pancakes"));
    assert_search_index_consistent(&target).await;
}
