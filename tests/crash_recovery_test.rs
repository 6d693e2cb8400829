//! Crash recovery and writer failure handling
//!
//! A creator either produces a complete archive at its target path or
//! nothing at all. Failing user callbacks reject one item and leave the
//! session usable.

use bytes::Bytes;
use std::path::Path;
use tempfile::tempdir;
use zim_rs::{
    Archive, CallbackResult, ContentProvider, Creator, CreatorConfig, CreatorState, ErrorKind,
    Hints, Item, StaticItem, ZimError,
};

/// Helper: names of the files in a directory
fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Provider that fails after its first chunk
struct FailingProvider {
    fed: bool,
}

impl ContentProvider for FailingProvider {
    fn size(&self) -> u64 {
        10
    }

    fn feed(&mut self) -> CallbackResult<Option<Bytes>> {
        if self.fed {
            return Err("disk on fire".into());
        }
        self.fed = true;
        Ok(Some(Bytes::from_static(b"12345")))
    }
}

/// Provider that feeds more than it declared
struct OversizedProvider;

impl ContentProvider for OversizedProvider {
    fn size(&self) -> u64 {
        3
    }

    fn feed(&mut self) -> CallbackResult<Option<Bytes>> {
        Ok(Some(Bytes::from_static(b"too long")))
    }
}

enum Failure {
    Title,
    Provider,
    Oversized,
}

struct BrokenItem {
    path: &'static str,
    failure: Failure,
}

impl Item for BrokenItem {
    fn path(&self) -> CallbackResult<String> {
        Ok(self.path.to_string())
    }

    fn title(&self) -> CallbackResult<String> {
        match self.failure {
            Failure::Title => Err("no title available".into()),
            _ => Ok("Broken".to_string()),
        }
    }

    fn mimetype(&self) -> CallbackResult<String> {
        Ok("text/plain".to_string())
    }

    fn content_provider(&self) -> CallbackResult<Box<dyn ContentProvider>> {
        match self.failure {
            Failure::Oversized => Ok(Box::new(OversizedProvider)),
            _ => Ok(Box::new(FailingProvider { fed: false })),
        }
    }

    fn hints(&self) -> CallbackResult<Hints> {
        Ok(Hints::default())
    }
}

#[test]
fn test_discard_leaves_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("discarded.zim");
    let mut creator = Creator::create(&path, CreatorConfig::new()).unwrap();
    creator
        .add_item(&StaticItem::new("a", "A", "text/plain", "data"))
        .unwrap();
    // The archive is built next to its target
    assert_eq!(files_in(dir.path()).len(), 1);

    creator.discard();
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_drop_finalizes_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dropped.zim");
    {
        let mut creator = Creator::create(&path, CreatorConfig::new()).unwrap();
        creator
            .add_item(&StaticItem::new("a", "A", "text/plain", "data"))
            .unwrap();
        // Dropped without close()
    }

    assert_eq!(files_in(dir.path()), vec!["dropped.zim"]);
    let archive = Archive::open(&path).unwrap();
    let item = archive.get_entry_by_path("a").unwrap().get_item(true).unwrap();
    assert_eq!(&item.content().unwrap()[..], b"data");
}

#[test]
fn test_close_twice() {
    let dir = tempdir().unwrap();
    let mut creator = Creator::create(dir.path().join("twice.zim"), CreatorConfig::new()).unwrap();
    creator.close().unwrap();
    assert_eq!(creator.state(), CreatorState::Closed);

    let err = creator.close().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(err.to_string().contains("already closed"));
}

#[test]
fn test_operations_after_close_fail() {
    let dir = tempdir().unwrap();
    let mut creator = Creator::create(dir.path().join("closed.zim"), CreatorConfig::new()).unwrap();
    creator.close().unwrap();

    let item = StaticItem::new("late", "Late", "text/plain", "late");
    assert_eq!(creator.add_item(&item).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        creator.add_metadata("Title", "late").unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        creator
            .add_redirection("r", "", "late", Hints::default())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        creator
            .add_illustration(48u32, vec![0u8; 4])
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(creator.set_main_path("late").unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn test_missing_directory_fails_at_create() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no/such/dir/archive.zim");
    let err = Creator::create(&path, CreatorConfig::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
}

#[test]
fn test_invalid_config_fails_at_create() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.zim");
    let err = Creator::create(&path, CreatorConfig::new().with_workers(0)).unwrap_err();
    assert!(matches!(err, ZimError::InvalidConfig(_)));
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_failing_callbacks_leave_creator_usable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("callbacks.zim");
    let mut creator = Creator::create(&path, CreatorConfig::new()).unwrap();

    let err = creator
        .add_item(&BrokenItem {
            path: "bad_title",
            failure: Failure::Title,
        })
        .unwrap_err();
    match &err {
        ZimError::Callback { accessor, path, .. } => {
            assert_eq!(*accessor, "title");
            assert_eq!(path, "bad_title");
        }
        other => panic!("Expected Callback error, got: {:?}", other),
    }
    assert!(err.to_string().contains("no title available"));

    let err = creator
        .add_item(&BrokenItem {
            path: "bad_feed",
            failure: Failure::Provider,
        })
        .unwrap_err();
    assert!(matches!(err, ZimError::Callback { accessor: "feed", .. }));
    assert_eq!(err.kind(), ErrorKind::ContractViolation);

    let err = creator
        .add_item(&BrokenItem {
            path: "bad_size",
            failure: Failure::Oversized,
        })
        .unwrap_err();
    assert!(matches!(err, ZimError::SizeMismatch { declared: 3, .. }));

    assert_eq!(creator.state(), CreatorState::Started);
    creator
        .add_item(&StaticItem::new("good", "Good", "text/plain", "fine"))
        .unwrap();
    // Failed paths were never registered
    creator
        .add_item(&StaticItem::new("bad_feed", "Retry", "text/plain", "retried"))
        .unwrap();
    creator.close().unwrap();

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.entry_count(), 2);
    assert!(!archive.has_entry_by_path("bad_title"));
    assert!(!archive.has_entry_by_path("bad_size"));
    let retried = archive.get_entry_by_path("bad_feed").unwrap().get_item(true).unwrap();
    assert_eq!(&retried.content().unwrap()[..], b"retried");
    assert_eq!(&archive.metadata("Counter").unwrap()[..], b"text/plain=2");
}

#[test]
fn test_invalid_paths_rejected() {
    let dir = tempdir().unwrap();
    let mut creator = Creator::create(dir.path().join("paths.zim"), CreatorConfig::new()).unwrap();
    let err = creator
        .add_item(&StaticItem::new("", "Empty", "text/plain", "x"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
    let err = creator
        .add_item(&StaticItem::new("a\0b", "Nul", "text/plain", "x"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
    creator.discard();
}

#[test]
fn test_full_mime_list_still_closes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mimes.zim");
    let config = CreatorConfig::new().with_indexing(true, "eng");
    let mut creator = Creator::create(&path, config).unwrap();

    // Fill the mime list until the creator refuses another distinct mimetype
    let mut accepted = 0;
    let refused = loop {
        let mimetype = format!("application/x-filler-{:08}", accepted);
        let item = StaticItem::new(&format!("item{}", accepted), "", &mimetype, "filler")
            .with_hints(Hints::front_article());
        match creator.add_item(&item) {
            Ok(()) => accepted += 1,
            Err(e) => break e,
        }
        assert!(accepted < 1000, "mime list never filled up");
    };
    assert_eq!(refused.kind(), ErrorKind::ContractViolation);
    assert!(accepted > 0);

    // Metadata and the indexes written at close still fit
    creator.add_metadata("Title", "Crowded").unwrap();
    creator.close().unwrap();
    assert_eq!(files_in(dir.path()), vec!["mimes.zim"]);

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.entry_count(), accepted);
    assert!(archive.has_title_index());
    assert!(archive.has_fulltext_index());
    assert_eq!(&archive.metadata("Title").unwrap()[..], b"Crowded");
    assert!(archive.metadata("Counter").is_ok());
    assert!(archive.check());
}
