use serde::{Deserialize, Serialize};

/// Profile data for the authenticated user, as returned by `GET /users/me/`.
///
/// Derived data only: always recomputed from the current credential, never
/// persisted on its own. The backend issues UUID ids; the client treats them
/// as opaque strings. Extra response fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
}
