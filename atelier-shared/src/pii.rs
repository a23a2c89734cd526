use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for shopper contact data that hides the value in Debug/Display
/// output so it cannot leak through `tracing` log macros. Serialization
/// passes the real value through, since API responses and the email
/// collaborator need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let email = Masked::new("shopper@example.com".to_string());
        assert_eq!(format!("{:?}", email), "<redacted>");
        assert_eq!(format!("{}", email), "<redacted>");
        assert_eq!(email.inner(), "shopper@example.com");
    }

    #[test]
    fn serialization_keeps_the_real_value() {
        let email = Masked::new("shopper@example.com".to_string());
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"shopper@example.com\"");
    }
}
