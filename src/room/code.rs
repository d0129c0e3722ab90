use rand::Rng;
use tracing::{debug, warn};

use super::repository::RoomRepository;
use crate::shared::AppError;

/// Upper-case letters and digits without the look-alikes I, O, 0 and 1
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LENGTH: usize = 6;
/// Draws allowed before giving up on finding a free code
pub const MAX_CODE_ATTEMPTS: usize = 100;

/// A random room code; may collide with an existing room
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Draws codes from `source` until one is not taken in the registry
pub async fn generate_unique<F>(
    repository: &(dyn RoomRepository + Send + Sync),
    mut source: F,
) -> Result<String, AppError>
where
    F: FnMut() -> String + Send,
{
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = source();
        if !repository.exists(&code).await? {
            return Ok(code);
        }
        debug!(room_code = %code, "Room code collision, retrying");
    }

    warn!(attempts = MAX_CODE_ATTEMPTS, "No free room code found");
    Err(AppError::Internal)
}

/// Room codes are typed by people; accept any case and surrounding spaces
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_valid(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}
