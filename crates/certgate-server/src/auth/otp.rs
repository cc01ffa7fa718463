//! TOTP second factor: enrollment secrets and code verification.

use totp_rs::{Algorithm, Secret, TOTP};

/// Issuer shown by authenticator apps.
pub const OTP_ISSUER: &str = "CertGate";

/// A fresh secret plus the `otpauth://` URL an authenticator app can import.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OtpEnrollment {
    pub secret: String,
    pub url: String,
}

/// Generate a random 160-bit secret bound to `account`.
///
/// Fails if the account name cannot appear in an `otpauth://` label.
pub fn generate_enrollment(account: &str) -> Result<OtpEnrollment, String> {
    let bytes = Secret::generate_secret()
        .to_bytes()
        .map_err(|e| e.to_string())?;
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some(OTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| e.to_string())?;

    Ok(OtpEnrollment {
        secret: totp.get_secret_base32(),
        url: totp.get_url(),
    })
}

/// Check a 6-digit code against a base32 secret (SHA-1, 30 s step, one step
/// of clock skew either way).
///
/// A secret that does not decode is treated as a failed check.
pub fn verify_code(secret_b32: &str, code: &str) -> bool {
    let Some(totp) = build_totp(secret_b32) else {
        tracing::error!("Stored OTP secret is not valid base32");
        return false;
    };
    totp.check_current(code.trim()).unwrap_or(false)
}

fn build_totp(secret_b32: &str) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret_b32.to_string()).to_bytes().ok()?;
    Some(TOTP::new_unchecked(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        None,
        String::new(),
    ))
}

/// Current code for `secret_b32`.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn current_code(secret_b32: &str) -> String {
    build_totp(secret_b32).unwrap().generate_current().unwrap()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // RFC 4648 base32 of "12345678901234567890", the RFC 6238 test key.
    const SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn current_code_verifies() {
        let code = build_totp(SECRET).unwrap().generate(now());
        assert!(verify_code(SECRET, &code));
    }

    #[test]
    fn previous_step_is_within_skew() {
        let code = build_totp(SECRET).unwrap().generate(now() - 30);
        assert!(verify_code(SECRET, &code));
    }

    #[test]
    fn distant_code_fails() {
        let code = build_totp(SECRET).unwrap().generate(now() - 600);
        assert!(!verify_code(SECRET, &code));
    }

    #[test]
    fn bad_secret_fails_closed() {
        assert!(!verify_code("not base32 !!", "123456"));
    }

    #[test]
    fn enrollment_secret_round_trips_through_verify() {
        let enrollment = generate_enrollment("carol").unwrap();
        assert!(enrollment.url.starts_with("otpauth://totp/CertGate:carol?"));
        assert!(enrollment.url.contains(&enrollment.secret));
        assert!(verify_code(&enrollment.secret, &current_code(&enrollment.secret)));

        let other = generate_enrollment("carol").unwrap();
        assert_ne!(enrollment.secret, other.secret);
    }

    #[test]
    fn colon_in_account_is_refused() {
        assert!(generate_enrollment("a:b").is_err());
    }
}
