mod api;
mod config;
mod error;
mod poller;
mod reducer;
mod segment;
mod serializer;
mod snapshot;
mod split;
mod store;
mod test_common;
mod util;

pub use api::*;
pub use config::*;
pub use error::*;
pub use poller::*;
pub use reducer::*;
pub use segment::*;
pub use serializer::*;
pub use snapshot::*;
pub use split::*;
pub use store::*;
pub use util::subset_key;
pub use util::SUBSET_KEY_DELIMITER;
