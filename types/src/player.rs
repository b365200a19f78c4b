//! Player identity as exposed through query responses.

use uuid::Uuid;

/// A connected player: username plus 128-bit UUID.
///
/// The wire form of the UUID is two big-endian `u64`s (most significant half
/// first); the string form (used for sorting and store snapshots) is the
/// standard hyphenated representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub username: String,
    pub uuid: Uuid,
}

impl Player {
    pub fn new(username: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            username: username.into(),
            uuid,
        }
    }

    /// Sort key used by paginated player listings: username first, then the
    /// hyphenated UUID string as a tiebreaker.
    pub fn sort_key(&self) -> (String, String) {
        (self.username.clone(), self.uuid.to_string())
    }
}
