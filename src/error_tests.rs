use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::unauthenticated("auth", "no").http_status(), 401);
    assert_eq!(AppError::forbidden("forbidden", "nope").http_status(), 403);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::conflict("conflict", "dup").http_status(), 400);
    assert_eq!(AppError::validation("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn store_errors_map_to_generic_messages() {
    let dup: AppError = StoreError::DuplicateUsername.into();
    assert_eq!(dup, AppError::username_unavailable());
    // Email collisions must not be distinguishable from username collisions.
    let dup_mail: AppError = StoreError::DuplicateEmail.into();
    assert_eq!(dup_mail, dup);

    let nf: AppError = StoreError::NotFound(7).into();
    assert_eq!(nf.http_status(), 404);

    let io: AppError = StoreError::Io(std::io::Error::other("disk gone")).into();
    assert_eq!(io.http_status(), 500);
    assert!(!io.message().contains("disk"), "internal causes must not leak: {}", io.message());
}

#[test]
fn unauthenticated_response_carries_bearer_challenge() {
    let resp = AppError::bad_token().into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");

    let resp = AppError::insufficient_role().into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
}

#[test]
fn anyhow_errors_become_opaque_internal() {
    let e: AppError = anyhow::anyhow!("secret connection string leaked").into();
    assert_eq!(e.http_status(), 500);
    assert_eq!(e.message(), MSG_INTERNAL);
}

#[test]
fn body_rejections_use_invalid_body() {
    use axum::extract::rejection::{JsonRejection, MissingJsonContentType};
    let e: AppError = JsonRejection::from(MissingJsonContentType::default()).into();
    assert_eq!(e, invalid_body());
    assert_eq!(e.into_response().status(), StatusCode::BAD_REQUEST);
}
