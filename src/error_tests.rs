use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::authentication("no_session", "sign in").http_status(), 401);
    assert_eq!(AppError::authorization("forbidden", "no").http_status(), 403);
    assert_eq!(AppError::not_found("entry_not_found", "missing").http_status(), 404);
    assert_eq!(AppError::user("bad_roster", "line 3").http_status(), 400);
    assert_eq!(AppError::conflict("store_conflict", "dup").http_status(), 409);
    assert_eq!(AppError::upstream("identity_unreachable", "timeout").http_status(), 502);
    assert_eq!(AppError::upstream("store_unavailable", "io").http_status(), 503);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn store_errors_map_to_upstream_or_conflict() {
    let e: AppError = StoreError::Io("disk full".into()).into();
    assert_eq!(e.code_str(), "store_unavailable");
    assert_eq!(e.http_status(), 503);

    let e: AppError = StoreError::Conflict("totals/a".into()).into();
    assert_eq!(e.http_status(), 409);

    let e: AppError = StoreError::InvalidKey("x/y@s.org".into()).into();
    assert_eq!(e.code_str(), "invalid_key");
    assert_eq!(e.http_status(), 400);
}

#[test]
fn authentication_errors_redirect_to_signin_with_reason() {
    let resp = AppError::authentication("bad_token", "not signed in: expired").into_response();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let loc = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(loc, "/#error:not%20signed%20in%3A%20expired");
}

#[test]
fn authorization_errors_do_not_redirect() {
    let resp = AppError::authorization("not_admin", "admins only").into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get(header::LOCATION).is_none());
}

#[test]
fn display_includes_code_and_message() {
    let e = AppError::not_found("entry_not_found", "no entry -Nabc");
    assert_eq!(e.to_string(), "entry_not_found: no entry -Nabc");
}
