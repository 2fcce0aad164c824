use super::models::EphemeralKey;

/// key: ephemeral-key-refresh-policy
/// Decides whether `key` must be refreshed before use. A key expiring at or before
/// `now_millis + buffer_secs` is treated as stale so in-flight requests never outlive it.
pub fn should_refresh(key: Option<&EphemeralKey>, now_millis: i64, buffer_secs: i64) -> bool {
    match key {
        None => true,
        Some(key) => {
            let horizon = now_millis.saturating_add(buffer_secs.saturating_mul(1000));
            key.expires_millis() <= horizon
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::parse_ephemeral_key;

    fn key_expiring_at(expires: i64) -> EphemeralKey {
        parse_ephemeral_key(&format!(r#"{{"id": "ephkey_1", "expires": {expires}}}"#)).unwrap()
    }

    #[test]
    fn absent_key_always_refreshes() {
        assert!(should_refresh(None, 0, 0));
        assert!(should_refresh(None, i64::MAX, 30));
        assert!(should_refresh(None, -5_000, -10));
    }

    #[test]
    fn within_buffer_refreshes() {
        let expires = 1_700_000_000;
        let key = key_expiring_at(expires);
        let now = (expires + 5) * 1000;
        assert!(should_refresh(Some(&key), now, 10));
    }

    #[test]
    fn beyond_double_buffer_is_fresh() {
        let expires = 1_700_000_000;
        let key = key_expiring_at(expires);
        let now = (expires - 21) * 1000;
        assert!(!should_refresh(Some(&key), now, 10));
    }

    #[test]
    fn boundary_counts_as_stale() {
        let expires = 1_700_000_000;
        let key = key_expiring_at(expires);
        let now = (expires - 10) * 1000;
        assert!(should_refresh(Some(&key), now, 10));
        assert!(!should_refresh(Some(&key), now - 1, 10));
    }

    #[test]
    fn large_inputs_saturate() {
        let key = key_expiring_at(i64::MAX);
        assert!(should_refresh(Some(&key), i64::MAX, i64::MAX));
    }
}
