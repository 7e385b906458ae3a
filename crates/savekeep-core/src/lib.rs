// ABOUTME: Core library for savekeep, containing slot types, bus events, and the save codec.
// ABOUTME: This crate defines the shared data model used by the store and the coordinator.

pub mod bus;
pub mod codec;
pub mod event;
pub mod obfuscate;
pub mod package;
pub mod participant;
pub mod slot;
pub mod state;
pub mod testing;

pub use bus::{DEFAULT_BUS_CAPACITY, EventBus, InMemoryEventBus};
pub use codec::{CodecError, Encoded, decode, encode, pack, unpack};
pub use event::{BusEvent, Completion, OperationKind};
pub use obfuscate::{ObfuscationError, Obfuscator, Plaintext, XorObfuscator};
pub use package::{PACKAGE_VERSION, SAVE_TIME_FORMAT, SavePackage, format_save_time};
pub use participant::{Persistable, spawn_participant};
pub use slot::{SaveSlotInfo, SlotError, SlotId};
pub use state::{CollectedState, EMPTY_SENTINEL_NAME, EMPTY_SENTINEL_PAYLOAD};
