//! One-off secrets handed to external tools (drive security, console login)

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric password of `len` characters
pub fn generate(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
