//! Cookie, redirect and HTML response helpers shared by the handlers.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::error::{AppError, AppResult};

pub const SESSION_COOKIE: &str = "service_hours_session";

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

fn cookie_attrs(secure: bool) -> &'static str {
    if secure { "HttpOnly; Secure; SameSite=Lax; Path=/" } else { "HttpOnly; SameSite=Lax; Path=/" }
}

pub fn set_session_cookie(token: &str, secure: bool) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; {}", SESSION_COOKIE, token, cookie_attrs(secure)))
        .map_err(|e| AppError::internal("bad_cookie".to_string(), e.to_string()))
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_str(&format!("{}=deleted; Max-Age=0; {}", SESSION_COOKIE, cookie_attrs(secure)))
        .unwrap_or_else(|_| HeaderValue::from_static("service_hours_session=deleted; Max-Age=0; Path=/"))
}

/// `303 See Other` to `location`, optionally setting a cookie.
pub fn see_other(location: &str, cookie: Option<HeaderValue>) -> Response {
    let mut resp = StatusCode::SEE_OTHER.into_response();
    let loc = HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    resp.headers_mut().insert(header::LOCATION, loc);
    if let Some(c) = cookie {
        resp.headers_mut().insert(header::SET_COOKIE, c);
    }
    resp
}

/// Path of a student's entry list. `@` and `.` stay readable.
pub fn student_path(email: &str) -> String {
    format!("/{}", urlencoding::encode(email).replace("%40", "@"))
}

/// Only same-site absolute paths are followed after sign-in.
pub fn safe_redirect(target: Option<&str>) -> Option<&str> {
    let t = target?.trim();
    if t.starts_with('/') && !t.starts_with("//") && !t.contains('\\') && HeaderValue::from_str(t).is_ok() {
        Some(t)
    } else {
        None
    }
}

pub fn html(body: String) -> Response {
    Html(body).into_response()
}
