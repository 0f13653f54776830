//! Typed ID definitions.

use crate::define_id;

// =============================================================================
// Identity
// =============================================================================

define_id!(UserId, "usr");
define_id!(TokenId, "tok");

// =============================================================================
// Booking
// =============================================================================

define_id!(BookingId, "bkg");

// =============================================================================
// Sessions and Requests
// =============================================================================

define_id!(ConnectionId, "conn");
define_id!(AttemptId, "att");
define_id!(RequestId, "req");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_user_id_roundtrip() {
        let id = UserId::new();
        let s = id.to_string();
        let parsed: UserId = s.parse().unwrap();
        assert_eq!(id, parsed);
        assert!(s.starts_with("usr_"));
    }

    #[test]
    fn test_booking_id_rejects_user_prefix() {
        let result: Result<BookingId, _> = "usr_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        let err = result.unwrap_err();
        assert!(err.is_prefix_error());
        assert_eq!(
            err,
            crate::IdError::InvalidPrefix {
                expected: "bkg",
                actual: "usr".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<UserId, _> = "usr01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_empty() {
        let result: Result<ConnectionId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<AttemptId, _> = "att_not-a-ulid".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidUlid(_)
        ));
    }

    #[test]
    fn test_json_is_plain_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let id1 = BookingId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = BookingId::new();
        assert!(id1 < id2);
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = vec![
            UserId::PREFIX,
            TokenId::PREFIX,
            BookingId::PREFIX,
            ConnectionId::PREFIX,
            AttemptId::PREFIX,
            RequestId::PREFIX,
        ];

        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn parse_never_panics(s in "\\PC*") {
            let _ = UserId::parse(&s);
        }
    }
}
