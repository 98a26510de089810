use ulid::Ulid;

/// Source of unique, lexicographically sortable identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// ULIDs: 10 characters of millisecond timestamp followed by 16 random
/// characters, Crockford base32.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> String {
        Ulid::new().to_string()
    }
}
