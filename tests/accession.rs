use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;

use metadata_repository::accession::AccessionGenerator;
use metadata_repository::domain::{Accession, Document, EntityKind};
use metadata_repository::error::RepoError;
use metadata_repository::store::{ACCESSION_TRACKER, Filter, MemoryStore, StoreAccessor};

const NOW: &str = "2024-05-01T08:00:00.000000Z";

/// Never reports an accession as tracked, as if every lookup raced with a
/// concurrent writer. Only the unique index stands between the generator and
/// a duplicate.
#[derive(Default)]
struct BlindTrackerStore {
    inner: MemoryStore,
}

impl StoreAccessor for BlindTrackerStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, RepoError> {
        if collection == ACCESSION_TRACKER {
            return Ok(None);
        }
        self.inner.find_one(collection, filter)
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, RepoError> {
        self.inner.find_many(collection, filter)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), RepoError> {
        self.inner.insert_one(collection, document)
    }

    fn delete_one(&self, collection: &str, id: &str) -> Result<bool, RepoError> {
        self.inner.delete_one(collection, id)
    }

    fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<Option<Document>, RepoError> {
        self.inner.update_fields(collection, filter, fields)
    }
}

#[test]
fn accession_format_per_kind() {
    let store = MemoryStore::new();
    let generator = AccessionGenerator::seeded("GHGA", 16, 1);
    for (kind, prefix) in [
        (EntityKind::File, "FIL"),
        (EntityKind::Dataset, "DAT"),
        (EntityKind::Submission, "SUB"),
        (EntityKind::DataAccessPolicy, "DAP"),
        (EntityKind::DataAccessCommittee, "DAC"),
    ] {
        let accession = generator.generate(&store, kind, NOW).unwrap();
        assert_eq!(accession.prefix(), prefix);
        assert!(accession.as_str().starts_with(&format!("GHGA:{prefix}")));
        assert_eq!(accession.as_str().len(), "GHGA:".len() + 3 + 12);
        assert!(accession.as_str().parse::<Accession>().is_ok());
    }
}

#[test]
fn sequential_accessions_are_distinct_and_tracked() {
    let store = MemoryStore::new();
    let generator = AccessionGenerator::seeded("GHGA", 16, 42);
    let mut seen = HashSet::new();
    for _ in 0..200 {
        let accession = generator.generate(&store, EntityKind::Sample, NOW).unwrap();
        assert!(seen.insert(accession));
    }
    assert_eq!(store.count(ACCESSION_TRACKER), 200);
}

#[test]
fn colliding_draw_is_redrawn_after_index_rejection() {
    let store = BlindTrackerStore::default();
    let first = AccessionGenerator::seeded("GHGA", 16, 9);
    let second = AccessionGenerator::seeded("GHGA", 16, 9);

    let a = first.generate(&store, EntityKind::File, NOW).unwrap();
    let b = second.generate(&store, EntityKind::File, NOW).unwrap();
    assert_ne!(a, b);
    assert_eq!(store.inner.count(ACCESSION_TRACKER), 2);
}

#[test]
fn generator_gives_up_after_max_attempts() {
    let store = BlindTrackerStore::default();
    AccessionGenerator::seeded("GHGA", 1, 5)
        .generate(&store, EntityKind::File, NOW)
        .unwrap();

    let err = AccessionGenerator::seeded("GHGA", 1, 5)
        .generate(&store, EntityKind::File, NOW)
        .unwrap_err();
    assert_matches!(err, RepoError::AccessionExhausted { attempts: 1, .. });
    assert_eq!(store.inner.count(ACCESSION_TRACKER), 1);
}

#[test]
fn concurrent_generation_never_repeats() {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(AccessionGenerator::seeded("GHGA", 16, 3));

    let accessions: Vec<Accession> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let generator = Arc::clone(&generator);
                scope.spawn(move || {
                    (0..25)
                        .map(|_| {
                            generator
                                .generate(store.as_ref(), EntityKind::Dataset, NOW)
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = accessions.iter().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(store.count(ACCESSION_TRACKER), 200);
}
