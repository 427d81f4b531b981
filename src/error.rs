use crate::crypto::random_zbase32;
use crate::utils::SecureRandom;
use http::StatusCode;
use log::{debug, error};
use std::error::Error;
use std::fmt;

/// Union of all possible runtime error types.
#[derive(Debug)]
pub enum BridgeError {
    /// User input error, which results in 400
    Input(String),
    /// Internal errors, which result in 500
    Internal(String),
}

impl BridgeError {
    /// Log this error at the appropriate log level.
    /// If `rng` is set, internal errors return a reference number for the error.
    pub async fn log(&self, rng: Option<&SecureRandom>) -> Option<String> {
        match *self {
            // User errors only at debug level.
            ref err @ BridgeError::Input(_) => {
                debug!("{}", err);
                None
            }
            // Internal errors should ring alarm bells.
            ref err @ BridgeError::Internal(_) => {
                if let Some(rng) = rng {
                    let reference = random_zbase32(6, rng).await;
                    error!("[REF:{}] {}", reference, err);
                    Some(reference)
                } else {
                    error!("{}", err);
                    None
                }
            }
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> StatusCode {
        match *self {
            BridgeError::Input(_) => StatusCode::BAD_REQUEST,
            BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Error for BridgeError {}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BridgeError::Input(ref description) | BridgeError::Internal(ref description) => {
                f.write_str(description)
            }
        }
    }
}

/// Result type with `BridgeError` for errors.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::BridgeError;
    use http::StatusCode;

    #[test]
    fn maps_to_status_codes() {
        let input = BridgeError::Input("Invalid target".to_owned());
        assert_eq!(input.http_status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(input.to_string(), "Invalid target");

        let internal = BridgeError::Internal("store unavailable".to_owned());
        assert_eq!(
            internal.http_status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn only_internal_errors_get_a_reference() {
        let rng = crate::utils::SecureRandom::new().await;
        let input = BridgeError::Input("POST required".to_owned());
        assert_eq!(input.log(Some(&rng)).await, None);

        let internal = BridgeError::Internal("store unavailable".to_owned());
        let reference = internal.log(Some(&rng)).await;
        assert_eq!(reference.map(|r| r.len()), Some(6));
        assert_eq!(internal.log(None).await, None);
    }
}
