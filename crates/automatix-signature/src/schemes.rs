// automatix-signature/src/schemes.rs
// ============================================================================
// Module: Per-Vendor Signature Schemes
// Description: One verification function per vendor's (header, algorithm,
//              canonicalization) triple.
// Purpose: Isolate each vendor's quirks so adding a new one never risks
//          another's behavior.
// Dependencies: hmac, sha1, sha2, base64, hex, subtle
// ============================================================================

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::VerifyOutcome;
use crate::VerifyRequest;

/// The vendor signature scheme a webhook trigger was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorScheme {
    /// No signature required; any body is accepted. Used by connectors
    /// that have no vendor signing scheme (internal triggers, tests).
    None,
    /// `v0:{ts}:{body}` HMAC-SHA256, hex, `v0=` prefix.
    Slack,
    /// `{ts}.{body}` HMAC-SHA256, hex, parsed out of `t=,v1=` pairs.
    Stripe,
    /// HMAC-SHA256 over the raw body, base64.
    Shopify,
    /// HMAC-SHA256 over the raw body, hex, `sha256=` prefix.
    Github,
    /// Direct equality against a shared token, not an HMAC.
    Gitlab,
    /// HMAC-SHA1 over the raw body, hex, `sha1=` prefix.
    Bitbucket,
    /// Identical wire format to [`VendorScheme::Bitbucket`].
    Intercom,
    /// HMAC-SHA256 over `{body}{secret}{ts}`, base64.
    Zendesk,
    /// HMAC-SHA256 over `METHOD + host + path + body + ts`, base64.
    Hubspot,
    /// HMAC-SHA256 over the raw body, base64.
    Docusign,
    /// HMAC-SHA256 over `{host}{path}{body}`, base64.
    Square,
    /// `{ts}.{body}` HMAC-SHA256, hex, parsed out of `t=,v1=` pairs
    /// (identical wire format to [`VendorScheme::Stripe`]).
    Calendly,
    /// HMAC-SHA1 over the raw body, base64.
    Surveymonkey,
}

impl VendorScheme {
    /// Maps a normalized connector app id to its vendor signature scheme,
    /// per the platform's per-provider scheme table. Unrecognized app ids
    /// (including `core` and any connector with no vendor signing scheme)
    /// map to [`VendorScheme::None`], which accepts every body — callers
    /// that need a secret-backed scheme must register one explicitly
    /// rather than rely on this fallback.
    #[must_use]
    pub fn for_app_id(app_id: &str) -> Self {
        match app_id {
            "slack" => Self::Slack,
            "stripe" => Self::Stripe,
            "shopify" => Self::Shopify,
            "github" => Self::Github,
            "gitlab" => Self::Gitlab,
            "bitbucket" => Self::Bitbucket,
            "intercom" => Self::Intercom,
            "zendesk" => Self::Zendesk,
            "hubspot" => Self::Hubspot,
            "docusign" => Self::Docusign,
            "square" => Self::Square,
            "calendly" => Self::Calendly,
            "surveymonkey" => Self::Surveymonkey,
            _ => Self::None,
        }
    }
}

pub(crate) fn dispatch(scheme: VendorScheme, request: &VerifyRequest<'_>) -> VerifyOutcome {
    match scheme {
        VendorScheme::None => VerifyOutcome::accept("no signature scheme configured"),
        VendorScheme::Slack => verify_slack(request),
        VendorScheme::Stripe | VendorScheme::Calendly => {
            verify_timestamped_hex(request, stripe_header_name(scheme))
        }
        VendorScheme::Shopify => verify_base64_over_body("x-shopify-hmac-sha256", request),
        VendorScheme::Github => verify_hex_prefixed("x-hub-signature-256", "sha256=", request, hmac_sha256),
        VendorScheme::Gitlab => verify_gitlab(request),
        VendorScheme::Bitbucket | VendorScheme::Intercom => {
            verify_hex_prefixed("x-hub-signature", "sha1=", request, hmac_sha1)
        }
        VendorScheme::Zendesk => verify_zendesk(request),
        VendorScheme::Hubspot => verify_hubspot(request),
        VendorScheme::Docusign => verify_base64_over_body("x-docusign-signature-1", request),
        VendorScheme::Square => verify_square(request),
        VendorScheme::Surveymonkey => verify_base64_sha1_over_body("sm-signature", request),
    }
}

fn stripe_header_name(scheme: VendorScheme) -> &'static str {
    match scheme {
        VendorScheme::Calendly => "calendly-webhook-signature",
        _ => "stripe-signature",
    }
}

fn header<'a>(request: &'a VerifyRequest<'_>, name: &str) -> Option<&'a str> {
    request.headers.get(name).map(String::as_str)
}

fn within_tolerance(now: u64, ts: u64, tolerance: u64) -> bool {
    now.abs_diff(ts) <= tolerance
}

fn ct_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// HMAC accepts keys of any length (RFC 2104), so `new_from_slice` failing
/// here would indicate the `hmac` crate rejecting a key for a reason that
/// does not apply to SHA-256/SHA-1; that can't happen in practice, but
/// since this crate never panics on attacker-reachable input, a key the
/// crate somehow rejects produces a digest that cannot match anything
/// rather than a panic.
pub(crate) fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

/// See [`hmac_sha256`].
pub(crate) fn hmac_sha1(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let Ok(mut mac) = <Hmac<Sha1> as Mac>::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

/// Test-only helper re-exported for the crate's own doctest-style example in
/// `lib.rs`'s unit tests.
#[cfg(test)]
pub(crate) fn hmac_sha256_hex(key: &[u8], msg: &[u8]) -> String {
    hex::encode(hmac_sha256(key, msg))
}

fn verify_slack(request: &VerifyRequest<'_>) -> VerifyOutcome {
    let Some(sig_header) = header(request, "x-slack-signature") else {
        return VerifyOutcome::reject("missing x-slack-signature header");
    };
    let Some(ts_header) = header(request, "x-slack-request-timestamp") else {
        return VerifyOutcome::reject("missing x-slack-request-timestamp header");
    };
    let Ok(ts) = ts_header.parse::<u64>() else {
        return VerifyOutcome::reject("x-slack-request-timestamp is not a valid integer");
    };
    if !within_tolerance(request.now_unix_sec, ts, request.timestamp_tolerance_sec) {
        return VerifyOutcome::reject("x-slack-request-timestamp outside tolerance window");
    }
    let Some(provided_hex) = sig_header.strip_prefix("v0=") else {
        return VerifyOutcome::reject("x-slack-signature missing v0= prefix");
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return VerifyOutcome::reject("x-slack-signature is not valid hex");
    };
    let body = String::from_utf8_lossy(request.raw_body);
    let message = format!("v0:{ts}:{body}");
    let expected = hmac_sha256(request.secret, message.as_bytes());
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("slack signature matched")
    } else {
        VerifyOutcome::reject("slack signature mismatch")
    }
}

/// Shared by Stripe and Calendly: `t=<ts>,v1=<hex>[,v1=<hex>...]`, message
/// `{ts}.{body}`, HMAC-SHA256 hex.
fn verify_timestamped_hex(request: &VerifyRequest<'_>, header_name: &str) -> VerifyOutcome {
    let Some(sig_header) = header(request, header_name) else {
        return VerifyOutcome::reject(format!("missing {header_name} header"));
    };
    let mut ts: Option<u64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in sig_header.split(',') {
        if let Some(value) = part.trim().strip_prefix("t=") {
            ts = value.parse::<u64>().ok();
        } else if let Some(value) = part.trim().strip_prefix("v1=") {
            if let Ok(bytes) = hex::decode(value) {
                candidates.push(bytes);
            }
        }
    }
    let Some(ts) = ts else {
        return VerifyOutcome::reject(format!("{header_name} missing t= component"));
    };
    if !within_tolerance(request.now_unix_sec, ts, request.timestamp_tolerance_sec) {
        return VerifyOutcome::reject(format!("{header_name} timestamp outside tolerance window"));
    }
    if candidates.is_empty() {
        return VerifyOutcome::reject(format!("{header_name} has no v1= component"));
    }
    let body = String::from_utf8_lossy(request.raw_body);
    let message = format!("{ts}.{body}");
    let expected = hmac_sha256(request.secret, message.as_bytes());
    if candidates.iter().any(|candidate| ct_eq_bytes(&expected, candidate)) {
        VerifyOutcome::accept("timestamped signature matched")
    } else {
        VerifyOutcome::reject("no v1= signature candidate matched")
    }
}

fn verify_base64_over_body(header_name: &str, request: &VerifyRequest<'_>) -> VerifyOutcome {
    verify_base64(header_name, request, hmac_sha256)
}

fn verify_base64_sha1_over_body(header_name: &str, request: &VerifyRequest<'_>) -> VerifyOutcome {
    verify_base64(header_name, request, hmac_sha1)
}

fn verify_base64(
    header_name: &str,
    request: &VerifyRequest<'_>,
    mac_fn: impl Fn(&[u8], &[u8]) -> Vec<u8>,
) -> VerifyOutcome {
    let Some(sig_header) = header(request, header_name) else {
        return VerifyOutcome::reject(format!("missing {header_name} header"));
    };
    let Ok(provided) = BASE64.decode(sig_header.trim()) else {
        return VerifyOutcome::reject(format!("{header_name} is not valid base64"));
    };
    let expected = mac_fn(request.secret, request.raw_body);
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("body signature matched")
    } else {
        VerifyOutcome::reject("body signature mismatch")
    }
}

fn verify_hex_prefixed(
    header_name: &str,
    prefix: &str,
    request: &VerifyRequest<'_>,
    mac_fn: impl Fn(&[u8], &[u8]) -> Vec<u8>,
) -> VerifyOutcome {
    let Some(sig_header) = header(request, header_name) else {
        return VerifyOutcome::reject(format!("missing {header_name} header"));
    };
    let Some(provided_hex) = sig_header.strip_prefix(prefix) else {
        return VerifyOutcome::reject(format!("{header_name} missing {prefix} prefix"));
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return VerifyOutcome::reject(format!("{header_name} is not valid hex"));
    };
    let expected = mac_fn(request.secret, request.raw_body);
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("body signature matched")
    } else {
        VerifyOutcome::reject("body signature mismatch")
    }
}

fn verify_gitlab(request: &VerifyRequest<'_>) -> VerifyOutcome {
    let Some(token) = header(request, "x-gitlab-token") else {
        return VerifyOutcome::reject("missing x-gitlab-token header");
    };
    if ct_eq_bytes(token.as_bytes(), request.secret) {
        VerifyOutcome::accept("gitlab token matched")
    } else {
        VerifyOutcome::reject("gitlab token mismatch")
    }
}

fn verify_zendesk(request: &VerifyRequest<'_>) -> VerifyOutcome {
    let Some(sig_header) = header(request, "x-zendesk-webhook-signature") else {
        return VerifyOutcome::reject("missing x-zendesk-webhook-signature header");
    };
    let Some(ts_header) = header(request, "x-zendesk-webhook-signature-timestamp") else {
        return VerifyOutcome::reject("missing x-zendesk-webhook-signature-timestamp header");
    };
    let Ok(provided) = BASE64.decode(sig_header.trim()) else {
        return VerifyOutcome::reject("x-zendesk-webhook-signature is not valid base64");
    };
    let mut message = Vec::with_capacity(request.raw_body.len() + request.secret.len() + ts_header.len());
    message.extend_from_slice(request.raw_body);
    message.extend_from_slice(request.secret);
    message.extend_from_slice(ts_header.as_bytes());
    let expected = hmac_sha256(request.secret, &message);
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("zendesk signature matched")
    } else {
        VerifyOutcome::reject("zendesk signature mismatch")
    }
}

fn verify_hubspot(request: &VerifyRequest<'_>) -> VerifyOutcome {
    let Some(sig_header) = header(request, "x-hubspot-signature") else {
        return VerifyOutcome::reject("missing x-hubspot-signature header");
    };
    let Some(ts_header) = header(request, "x-hubspot-request-timestamp") else {
        return VerifyOutcome::reject("missing x-hubspot-request-timestamp header");
    };
    let Ok(ts) = ts_header.parse::<u64>() else {
        return VerifyOutcome::reject("x-hubspot-request-timestamp is not a valid integer");
    };
    if !within_tolerance(request.now_unix_sec, ts, request.timestamp_tolerance_sec) {
        return VerifyOutcome::reject("x-hubspot-request-timestamp outside tolerance window");
    }
    let Ok(provided) = BASE64.decode(sig_header.trim()) else {
        return VerifyOutcome::reject("x-hubspot-signature is not valid base64");
    };
    let body = String::from_utf8_lossy(request.raw_body);
    let message = format!("{}{}{}{}{}", request.method, request.host, request.path, body, ts_header);
    let expected = hmac_sha256(request.secret, message.as_bytes());
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("hubspot signature matched")
    } else {
        VerifyOutcome::reject("hubspot signature mismatch")
    }
}

fn verify_square(request: &VerifyRequest<'_>) -> VerifyOutcome {
    let Some(sig_header) = header(request, "x-square-hmacsha256-signature") else {
        return VerifyOutcome::reject("missing x-square-hmacsha256-signature header");
    };
    let Ok(provided) = BASE64.decode(sig_header.trim()) else {
        return VerifyOutcome::reject("x-square-hmacsha256-signature is not valid base64");
    };
    let body = String::from_utf8_lossy(request.raw_body);
    let message = format!("{}{}{}", request.host, request.path, body);
    let expected = hmac_sha256(request.secret, message.as_bytes());
    if ct_eq_bytes(&expected, &provided) {
        VerifyOutcome::accept("square signature matched")
    } else {
        VerifyOutcome::reject("square signature mismatch")
    }
}
