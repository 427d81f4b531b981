use headers::{Header, HeaderMapExt};
use http::header::{HeaderName, HeaderValue, CONTENT_SECURITY_POLICY};
use http::Response;
use std::convert::TryFrom;
use std::fmt::Debug;

/// Shorthands for setting response headers.
pub trait ResponseExt {
    fn header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
        <HeaderName as TryFrom<K>>::Error: Debug,
        <HeaderValue as TryFrom<V>>::Error: Debug;

    fn typed_header(&mut self, header: impl Header) -> &mut Self;

    /// Set the content security policy from a list of directives.
    fn content_security_policy(&mut self, directives: &[&str]) -> &mut Self;

    /// Whether a content security policy was already set.
    fn has_content_security_policy(&self) -> bool;
}

impl<B> ResponseExt for Response<B> {
    fn header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
        <HeaderName as TryFrom<K>>::Error: Debug,
        <HeaderValue as TryFrom<V>>::Error: Debug,
    {
        self.headers_mut().insert(
            HeaderName::try_from(key).expect("header name must be valid"),
            HeaderValue::try_from(value).expect("header value must be valid"),
        );
        self
    }

    fn typed_header(&mut self, header: impl Header) -> &mut Self {
        self.headers_mut().typed_insert(header);
        self
    }

    fn content_security_policy(&mut self, directives: &[&str]) -> &mut Self {
        let csp = directives.join("; ");
        self.header(CONTENT_SECURITY_POLICY, csp.clone());
        self.header("x-content-security-policy", csp)
    }

    fn has_content_security_policy(&self) -> bool {
        self.headers().contains_key(CONTENT_SECURITY_POLICY)
    }
}
