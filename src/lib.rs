//! Ephemeral API key lifecycle management.
//!
//! An [`EphemeralKeyManager`] keeps a short-lived key fresh on behalf of a sequence of
//! [`Operation`]s: each request either runs immediately against the current key or waits behind
//! a single fetch through a [`KeyProvider`]. Every executed operation yields exactly one
//! [`KeyUpdateListener`] callback.

pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod listener;
pub mod manager;
pub mod operation;
pub mod provider;
pub mod telemetry;

pub use clock::{Clock, SystemClock};
pub use config::{
    KeyManagerConfig, DEFAULT_API_VERSION, DEFAULT_COMMAND_BUFFER, DEFAULT_REFRESH_BUFFER_SECS,
    KEY_MANAGER_CONFIG,
};
pub use error::{KeyParseError, ProviderError, ProviderResult, INTERNAL_ERROR_CODE};
pub use keys::{parse_ephemeral_key, should_refresh, AssociatedObject, EphemeralKey};
pub use listener::{ChannelListener, KeyEvent, KeyUpdateListener};
pub use manager::{EphemeralKeyManager, KeyState, KeyStateKind, KeyStateMachine, KeyStatus};
pub use operation::{
    Address, Operation, OperationIdFactory, OperationKind, OperationScope, ShippingInformation,
    UuidOperationIdFactory,
};
pub use provider::{HttpKeyProvider, KeyProvider};
