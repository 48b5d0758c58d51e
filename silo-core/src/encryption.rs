use crate::{Result, Value};

/// Encryption scheme applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Same plaintext always produces the same ciphertext, so equality
    /// predicates keep working.
    Deterministic,
    /// Fresh ciphertext per write; the column cannot be filtered on.
    Randomized,
}

/// Column-level encryption collaborator, invoked transparently around reads
/// and writes of columns that carry an encryption identifier.
pub trait EncryptionProvider: Send + Sync {
    /// Mode configured for the column, or `None` when the column is not
    /// under encryption despite carrying an identifier.
    fn mode(&self, column_id: &str) -> Option<EncryptionMode>;

    fn encrypt(&self, mode: EncryptionMode, value: &Value) -> Result<Value>;

    /// Attempts decryption; `None` means the value did not decrypt and the
    /// original should be kept as-is.
    fn try_decrypt(&self, value: &Value) -> Option<Value>;

    /// Whether the value carries the provider's ciphertext marker.
    fn has_encryption_magic(&self, value: &Value) -> bool;
}
