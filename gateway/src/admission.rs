//! Handshake & Admission (§4.F): header validation, token verification,
//! the administrative allow-list, and the app-version gate, before a
//! connection is handed to the session actor.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::session::GatewaySession;
use crate::state::AppState;

const LOAD_TEST_PREFIX: &str = "LT";
const SUPER_ADMIN_ACCOUNT: &str = "18033060554";
const ADMIN_RANGE_A: (u64, u64) = (11122233301, 11122233305);
const ADMIN_RANGE_B: (u64, u64) = (11122233395, 11122233398);

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+$").expect("version regex is a compile-time constant")
});

/// Accounts in the fixed administrative allow-list skip the version gate
/// entirely (§10.5); everything else must match `SUPPORTED_MAJOR_AND_MINOR`.
fn is_administrative_account(account: &str) -> bool {
    if account == SUPER_ADMIN_ACCOUNT {
        return true;
    }
    let Ok(parsed) = account.parse::<u64>() else {
        return false;
    };
    (parsed >= ADMIN_RANGE_A.0 && parsed <= ADMIN_RANGE_A.1)
        || (parsed >= ADMIN_RANGE_B.0 && parsed <= ADMIN_RANGE_B.1)
}

/// Load-test traffic is tagged by a literal `LT` account prefix and bypasses
/// token verification so synthetic load can be generated without minting
/// real credentials.
fn is_load_test_account(account: &str) -> bool {
    account.starts_with(LOAD_TEST_PREFIX)
}

fn client_ip(req: &HttpRequest) -> String {
    for header in ["X-Forwarded-For", "X-Real-Ip", "X-App-Engine-Remote-Addr"] {
        if let Some(value) = req.headers().get(header).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or(value).trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn required_header<'a>(req: &'a HttpRequest, name: &'static str) -> GatewayResult<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::MissingHeader(name))
}

fn check_app_version(account: &str, version: &str, supported: &str) -> GatewayResult<()> {
    if is_administrative_account(account) {
        return Ok(());
    }
    if !VERSION_PATTERN.is_match(version) {
        return Err(GatewayError::UnsupportedVersion);
    }
    let major_minor = |v: &str| v.splitn(3, '.').take(2).collect::<Vec<_>>().join(".");
    if major_minor(version) != major_minor(supported) {
        return Err(GatewayError::UnsupportedVersion);
    }
    Ok(())
}

#[actix_web::get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> actix_web::Result<HttpResponse> {
    let uid = required_header(&req, "x-uid")?;

    if !is_load_test_account(uid) {
        let account = required_header(&req, "x-sec-account")?;
        let token = required_header(&req, "x-sec-token")?;

        let verified = state
            .token_verifier
            .verify(account, token)
            .map_err(|err| GatewayError::VerifierUnavailable(err.to_string()))?;
        if !verified {
            return Err(GatewayError::InvalidToken.into());
        }

        let app_version = required_header(&req, "x-app-version")?;
        check_app_version(account, app_version, &state.config.supported_app_version)?;
    }

    let ip = client_ip(&req);
    let current = state.registry.connection_count();
    if current >= state.registry.cap() {
        warn!(uid, ip, "connection rejected: registry at capacity");
        return Err(GatewayError::CapacityExceeded.into());
    }

    let session = GatewaySession::new(uid.to_string(), ip.clone(), state.get_ref().clone());
    info!(uid, ip, "admitting websocket connection");

    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(state.config.read_limit_bytes)
        .start()
}

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_bypasses_version_gate() {
        assert!(check_app_version(SUPER_ADMIN_ACCOUNT, "garbage", "1.0.0").is_ok());
    }

    #[test]
    fn admin_range_accounts_bypass_version_gate() {
        assert!(is_administrative_account("11122233303"));
        assert!(is_administrative_account("11122233396"));
        assert!(!is_administrative_account("11122233306"));
        assert!(!is_administrative_account("11122233399"));
    }

    #[test]
    fn matching_major_minor_passes() {
        assert!(check_app_version("555", "1.2.9", "1.2.0").is_ok());
    }

    #[test]
    fn mismatched_major_minor_fails() {
        let err = check_app_version("555", "2.0.0", "1.2.0").unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedVersion));
    }

    #[test]
    fn malformed_version_fails() {
        let err = check_app_version("555", "not-a-version", "1.2.0").unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedVersion));
    }

    #[test]
    fn load_test_prefix_is_recognized() {
        assert!(is_load_test_account("LT-0001"));
        assert!(!is_load_test_account("555"));
    }
}
