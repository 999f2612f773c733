//! HMAC-SHA256 signed session cookie.
//!
//! Cookie value: `base64url(json).base64url(hmac(secret, name | json))`
//! where `json` is `{"u": <username>, "key": <session token>}`. Binding the
//! cookie name into the MAC stops a value minted for one cookie from being
//! replayed under another.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Decoded cookie contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    #[serde(rename = "u")]
    pub username: String,
    #[serde(rename = "key")]
    pub token: String,
}

/// Signs and verifies the session cookie
#[derive(Clone)]
pub struct CookieCodec {
    name: String,
    secret: Vec<u8>,
}

impl CookieCodec {
    pub fn new(name: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        CookieCodec {
            name: name.into(),
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC key length is always valid");
        mac.update(self.name.as_bytes());
        mac.update(b"|");
        mac.update(payload);
        mac
    }

    /// Encode and sign a cookie value
    pub fn encode(&self, cookie: &SessionCookie) -> String {
        let payload =
            serde_json::to_vec(cookie).expect("cookie payload is two strings and always serializes");
        let signature = self.mac(&payload).finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify and decode a cookie value.
    ///
    /// Returns `None` for anything that is not a value this codec signed.
    /// Nothing from the payload is read before the signature checks out.
    pub fn decode(&self, value: &str) -> Option<SessionCookie> {
        let (payload_part, sig_part) = value.split_once('.')?;

        let payload = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(sig_part).ok()?;

        self.mac(&payload).verify_slice(&signature).ok()?;

        serde_json::from_slice(&payload).ok()
    }

    /// `Set-Cookie` header value carrying the signed session.
    ///
    /// No `Expires`/`Max-Age`: the browser drops it when the session ends.
    pub fn set_cookie_header(&self, cookie: &SessionCookie) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name,
            self.encode(cookie)
        )
    }

    /// `Set-Cookie` header value that removes the cookie from the browser
    pub fn removal_header(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.name
        )
    }

    /// Pull this codec's cookie out of a raw `Cookie` request header
    pub fn find_in_header<'a>(&self, header: &'a str) -> Option<&'a str> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie() -> SessionCookie {
        SessionCookie {
            username: "alice".to_string(),
            token: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let codec = CookieCodec::new("session", b"test-secret-key");
        let value = codec.encode(&cookie());

        assert_eq!(codec.decode(&value), Some(cookie()));
        // cookie values must stay header-safe
        assert!(!value.contains(';') && !value.contains(' ') && !value.contains(','));
    }

    #[test]
    fn test_payload_uses_short_keys() {
        let json = serde_json::to_value(cookie()).unwrap();
        assert_eq!(json["u"], "alice");
        assert!(json.get("key").is_some());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let value = CookieCodec::new("session", b"secret-a").encode(&cookie());
        assert_eq!(CookieCodec::new("session", b"secret-b").decode(&value), None);
    }

    #[test]
    fn test_other_cookie_name_fails() {
        let value = CookieCodec::new("session", b"secret").encode(&cookie());
        assert_eq!(CookieCodec::new("other", b"secret").decode(&value), None);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let codec = CookieCodec::new("session", b"secret");
        let value = codec.encode(&cookie());
        let (_, sig) = value.split_once('.').unwrap();

        let forged = SessionCookie {
            username: "mallory".to_string(),
            token: cookie().token,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}", forged_payload, sig);

        assert_eq!(codec.decode(&tampered), None);
    }

    #[test]
    fn test_garbage_fails() {
        let codec = CookieCodec::new("session", b"secret");
        assert_eq!(codec.decode(""), None);
        assert_eq!(codec.decode("no-dot-here"), None);
        assert_eq!(codec.decode("!!!.???"), None);
    }

    #[test]
    fn test_find_in_header() {
        let codec = CookieCodec::new("session", b"secret");
        assert_eq!(codec.find_in_header("theme=dark; session=abc.def"), Some("abc.def"));
        assert_eq!(codec.find_in_header("sessionx=1; theme=dark"), None);
    }

    #[test]
    fn test_set_cookie_header_has_root_path_and_no_expiry() {
        let codec = CookieCodec::new("session", b"secret");
        let header = codec.set_cookie_header(&cookie());
        assert!(header.starts_with("session="));
        assert!(header.contains("Path=/"));
        assert!(!header.contains("Expires") && !header.contains("Max-Age"));
    }
}
