//! Cache key scheme
//!
//! Keys are plain strings derived from identifiers only, so a restarted
//! client finds the entries an earlier run wrote.

/// Key of a product snapshot
#[inline]
#[must_use]
pub fn product(product_id: &str) -> String {
    product_id.to_string()
}

/// Key of an instrument's last known status
#[inline]
#[must_use]
pub fn instrument(access_code: &str) -> String {
    access_code.to_string()
}

/// Key of one cached form answer
#[inline]
#[must_use]
pub fn field(access_code: &str, field_name: &str) -> String {
    format!("{access_code}-{field_name}")
}

/// Prefix shared by every answer of one instrument
#[inline]
#[must_use]
pub fn field_prefix(access_code: &str) -> String {
    format!("{access_code}-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_layout() {
        assert_eq!(product("P1"), "P1");
        assert_eq!(instrument("abc"), "abc");
        assert_eq!(field("abc", "q1"), "abc-q1");
    }

    proptest! {
        #[test]
        fn field_keys_share_instrument_prefix(code in "[a-z0-9]{1,16}", name in "[a-z0-9_]{1,16}") {
            prop_assert!(field(&code, &name).starts_with(&field_prefix(&code)));
            prop_assert!(!instrument(&code).starts_with(&field_prefix(&code)));
        }
    }
}
