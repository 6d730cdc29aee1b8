pub mod cipher;
pub mod crypto;
pub mod store;
pub mod types;

pub use cipher::{HostIdCipher, MachineKeyCipher};
pub use store::{SecretStore, StoreError};
