pub mod store;

pub use self::store::*;
