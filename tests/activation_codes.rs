use chrono::{Duration, Utc};

use streamgenius_lib::activation::{self, SubscriptionStatus, PLAN_MONTHS};

#[test]
fn test_generated_codes_validate_for_every_plan() {
    for device in ["ABCD1234", "0Z9Y8X7W", "K4RD24TV"] {
        for months in PLAN_MONTHS {
            let code = activation::generate(device, months).unwrap();
            assert!(code.starts_with(&format!("{}-", months)));
            let hash = code.split_once('-').unwrap().1;
            assert!(hash.len() <= 6 && !hash.is_empty());
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

            let result = activation::validate(&code, device);
            assert!(result.valid, "{} should unlock {}", code, device);
            assert_eq!(result.months, Some(months));
        }
    }
}

#[test]
fn test_code_is_bound_to_device() {
    let code = activation::generate("ABCD1234", 6).unwrap();
    let result = activation::validate(&code, "ABCD1235");
    assert!(!result.valid);
    assert_eq!(result.months, None);
}

#[test]
fn test_tampered_months_rejected() {
    let code = activation::generate("ABCD1234", 1).unwrap();
    let forged = code.replacen("1-", "12-", 1);
    assert!(!activation::validate(&forged, "ABCD1234").valid);
}

#[test]
fn test_malformed_codes_are_invalid() {
    for code in ["", "-", "6", "6-", "-ABCDEF", "x-ABCDEF", "0-ABCDEF", "-6-ABCDEF", "6.5-ABCDEF", "99999999999-AB"] {
        let result = activation::validate(code, "ABCD1234");
        assert!(!result.valid, "{:?} must be rejected", code);
    }
}

#[test]
fn test_surrounding_whitespace_ignored_case_kept() {
    let code = activation::generate("ABCD1234", 12).unwrap();
    let padded = format!("  {}\n", code);
    assert!(activation::validate(&padded, "ABCD1234").valid);
    // the hash is compared exactly, as issued
    assert!(!activation::validate(&code.to_lowercase(), "ABCD1234").valid);
}

#[test]
fn test_known_codes() {
    let known = [
        ("7X2M9P1Q", 1, "1-259CF3"),
        ("AB12CD34", 6, "6-19BE51"),
        ("DEVICE01", 12, "12-6B6E2A"),
        ("زارۆک", 6, "6-649888"),
    ];
    for (device, months, code) in known {
        assert_eq!(activation::generate(device, months).as_deref(), Some(code));
        assert_eq!(
            activation::validate(code, device),
            activation::Validation { valid: true, months: Some(months) }
        );
    }
}

#[test]
fn test_zero_month_codes_are_refused() {
    assert!(activation::generate("ABCD1234", 0).is_none());
    assert!(!activation::validate("0-000000", "ABCD1234").valid);
}

#[test]
fn test_subscription_window() {
    let now = Utc::now();
    let expiry = activation::expiry_after(now, 1);
    assert!(expiry > now + Duration::days(27));
    assert!(SubscriptionStatus::at(Some(expiry), now).active);
    assert!(!SubscriptionStatus::at(Some(expiry), expiry + Duration::seconds(1)).active);
    assert!(!SubscriptionStatus::at(None, now).active);
}
