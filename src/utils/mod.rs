pub mod agent;
pub mod base64url;
pub mod http;
pub mod logger;
mod rng;

use std::{error::Error, future::Future, pin::Pin};

pub use rng::*;

pub type BoxError = Box<dyn Error + Send + Sync>;
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
