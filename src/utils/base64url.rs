use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[inline]
pub fn encode<T: ?Sized + AsRef<[u8]>>(data: &T) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Whether the input only contains characters of the unpadded url-safe alphabet.
pub fn is_alphabet(input: &str) -> bool {
    input
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
