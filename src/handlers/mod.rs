pub mod bridge;
#[cfg(feature = "insecure")]
pub mod login;
pub mod pages;
