use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::debug;

use crate::domain::{ACCESSION_FIELD, Accession, Document, EntityKind};
use crate::error::RepoError;
use crate::store::{ACCESSION_TRACKER, Filter, StoreAccessor};

const MAX_NUMBER: u64 = 999_999_999_999;

/// Hands out `NAMESPACE:PFX000000000000` accessions and records each one in
/// the tracker collection.
///
/// The lookup before the insert only avoids wasted writes. Uniqueness is
/// guaranteed by the tracker's unique index: a duplicate-key rejection counts
/// as a collision and a new number is drawn.
#[derive(Debug)]
pub struct AccessionGenerator {
    namespace: String,
    max_attempts: usize,
    rng: Mutex<StdRng>,
}

impl AccessionGenerator {
    pub fn new(namespace: &str, max_attempts: usize) -> Self {
        Self::with_rng(namespace, max_attempts, StdRng::from_os_rng())
    }

    pub fn seeded(namespace: &str, max_attempts: usize, seed: u64) -> Self {
        Self::with_rng(namespace, max_attempts, StdRng::seed_from_u64(seed))
    }

    fn with_rng(namespace: &str, max_attempts: usize, rng: StdRng) -> Self {
        Self {
            namespace: namespace.to_string(),
            max_attempts: max_attempts.max(1),
            rng: Mutex::new(rng),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn candidate(&self, kind: EntityKind) -> Result<Accession, RepoError> {
        let number = self
            .rng
            .lock()
            .map_err(|_| RepoError::Store("accession rng lock poisoned".to_string()))?
            .random_range(1..=MAX_NUMBER);
        Ok(Accession::compose(&self.namespace, kind, number))
    }

    pub fn generate<S: StoreAccessor + ?Sized>(
        &self,
        store: &S,
        kind: EntityKind,
        timestamp: &str,
    ) -> Result<Accession, RepoError> {
        for _ in 0..self.max_attempts {
            let accession = self.candidate(kind)?;
            let taken = store
                .find_one(
                    ACCESSION_TRACKER,
                    &Filter::eq(ACCESSION_FIELD, accession.as_str()),
                )?
                .is_some();
            if taken {
                debug!(%accession, "accession already tracked, drawing again");
                continue;
            }

            match store.insert_one(ACCESSION_TRACKER, tracker_record(&accession, timestamp)) {
                Ok(()) => return Ok(accession),
                Err(RepoError::DuplicateKey { .. }) => {
                    debug!(%accession, "accession claimed concurrently, drawing again");
                }
                Err(err) => return Err(err),
            }
        }

        Err(RepoError::AccessionExhausted {
            kind: kind.to_string(),
            attempts: self.max_attempts,
        })
    }
}

fn tracker_record(accession: &Accession, timestamp: &str) -> Document {
    let mut record = Document::new();
    record.insert(ACCESSION_FIELD.to_string(), json!(accession.as_str()));
    record.insert("timestamp".to_string(), json!(timestamp));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn generated_accession_parses_and_is_tracked() {
        let store = MemoryStore::new();
        let generator = AccessionGenerator::seeded("GHGA", 4, 7);
        let accession = generator
            .generate(&store, EntityKind::DataAccessPolicy, "2024-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(accession.prefix(), "DAP");
        assert!(accession.as_str().parse::<Accession>().is_ok());
        assert_eq!(store.count(ACCESSION_TRACKER), 1);
    }
}
