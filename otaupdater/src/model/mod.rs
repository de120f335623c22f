//! Update records and their status vocabulary.
//!
//! The status of an update is split in two:
//!
//! - [`PersistentStatus`] is the small durable subset written to the store
//!   (`Unknown`, `Incomplete`, `Verified`).
//! - [`UpdateStatus`] is the full runtime state machine, rebuilt from the
//!   persistent status whenever a record is loaded.
//!
//! ```text
//! UpdateDescriptor (catalog) ──► UpdateRecord ◄── StoredUpdate (store)
//!                                     │
//!                                     ├── status: UpdateStatus        (memory only)
//!                                     └── persistent_status           (durable)
//! ```

mod descriptor;
mod record;
mod status;

pub use descriptor::UpdateDescriptor;
pub use record::{UpdateRecord, LOCAL_ID};
pub use status::{PersistentStatus, UpdateStatus};
