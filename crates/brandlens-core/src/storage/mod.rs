pub mod medium;
pub mod scope;
pub mod secure;

pub use medium::{FileMedium, MemoryMedium, SharedMedium, StorageMedium};
pub use scope::UserScope;
pub use secure::{CredentialStore, EncryptedScope};
