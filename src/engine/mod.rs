pub mod codec;
pub mod observer;
pub mod path;
pub mod persistence;
pub mod schema;
pub mod shared;
pub mod store;
pub mod vault;

pub use codec::{Codec, Envelope};
pub use observer::{LoggingObserver, StoreObserver};
pub use path::QueryEntry;
pub use persistence::Persistence;
pub use schema::{FieldSpec, Schema};
pub use shared::SharedStore;
pub use store::Store;
