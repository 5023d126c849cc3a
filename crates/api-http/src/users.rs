use account_auth::IssuedToken;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
};
use booking_service::{
    LoginAttempt, LoginOutcome, ProfileUpdate, Registration, ServiceError, Session,
};
use platform_core::ResponseEnvelope;
use serde::{Deserialize, Serialize};
use ticket_domain::UserProfile;
use tracing::info;

use crate::{
    AdminUser, ApiError, ApiResult, AppState, AuthUser, JsonBody, RequestMeta, done,
    guard::SESSION_COOKIE, ok,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub phone_number: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub captcha_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub remember_device: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPayload {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersPayload {
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatedUserPayload {
    pub data: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub token: String,
    pub user_data: UserProfile,
}

/// Login either hands out a session or asks for an emailed code.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_otp_required: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginPayload {
    pub token: String,
    pub user_data: UserProfile,
    pub is_new_user: bool,
}

type WithCookie<T> = Result<(HeaderMap, Json<ResponseEnvelope<T>>), ApiError>;

fn cookie_headers(value: String) -> Result<HeaderMap, ApiError> {
    let value = HeaderValue::from_str(&value)
        .map_err(|err| ApiError(ServiceError::internal("session cookie rejected", err)))?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value);
    Ok(headers)
}

fn session_cookie(state: &AppState, token: &IssuedToken) -> Result<HeaderMap, ApiError> {
    let max_age = state.services.accounts.jwt().ttl().num_seconds();
    let secure = if state.http.cookie_secure { "; Secure" } else { "" };
    cookie_headers(format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly{secure}; SameSite=Strict; Max-Age={max_age}",
        token.token
    ))
}

fn cleared_cookie(state: &AppState) -> Result<HeaderMap, ApiError> {
    let secure = if state.http.cookie_secure { "; Secure" } else { "" };
    cookie_headers(format!(
        "{SESSION_COOKIE}=; Path=/; HttpOnly{secure}; SameSite=Strict; Max-Age=0"
    ))
}

fn signed_in(state: &AppState, message: &str, session: Session) -> WithCookie<SessionPayload> {
    let headers = session_cookie(state, &session.token)?;
    Ok((
        headers,
        ok(
            message,
            SessionPayload {
                token: session.token.token,
                user_data: session.profile,
            },
        ),
    ))
}

pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<UserPayload>>), ApiError> {
    info!(route = "/api/user/create", "api http request");
    let user = state
        .services
        .accounts
        .register(Registration {
            username: body.username,
            phone_number: body.phone_number,
            email: body.email,
            password: body.password,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ok("User Created Successfully!", UserPayload { user }),
    ))
}

pub async fn login_user(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<LoginRequest>,
) -> WithCookie<LoginPayload> {
    info!(route = "/api/user/login", "api http request");
    let outcome = state
        .services
        .accounts
        .login(
            LoginAttempt {
                email: body.email,
                password: body.password,
                captcha_token: body.captcha_token,
            },
            &meta.client(),
        )
        .await?;
    match outcome {
        LoginOutcome::Authenticated(session) => {
            let headers = session_cookie(&state, &session.token)?;
            Ok((
                headers,
                ok(
                    "User logged in successfully",
                    LoginPayload {
                        token: Some(session.token.token),
                        user_data: Some(session.profile),
                        ..LoginPayload::default()
                    },
                ),
            ))
        }
        LoginOutcome::OtpRequired => Ok((
            HeaderMap::new(),
            ok(
                "OTP sent to your email. Verify to continue.",
                LoginPayload {
                    otp_required: Some(true),
                    ..LoginPayload::default()
                },
            ),
        )),
        LoginOutcome::RegisterOtpRequired => Ok((
            HeaderMap::new(),
            ok(
                "OTP sent to your email. Verify to continue.",
                LoginPayload {
                    register_otp_required: Some(true),
                    ..LoginPayload::default()
                },
            ),
        )),
    }
}

pub async fn verify_register_otp(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<OtpRequest>,
) -> WithCookie<SessionPayload> {
    info!(route = "/api/user/verify_register_otp", "api http request");
    let session = state
        .services
        .accounts
        .verify_register_otp(&body.email, &body.otp, &meta.client())
        .await?;
    signed_in(&state, "OTP verified successfully!", session)
}

pub async fn verify_login_otp(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<OtpRequest>,
) -> WithCookie<SessionPayload> {
    info!(route = "/api/user/verify_login_otp", "api http request");
    let session = state
        .services
        .accounts
        .verify_login_otp(&body.email, &body.otp, &meta.client())
        .await?;
    signed_in(&state, "OTP verified successfully!", session)
}

pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<()> {
    info!(route = "/api/user/forgot-password", "api http request");
    state.services.accounts.forgot_password(&body.email).await?;
    Ok(done("OTP sent to your email"))
}

pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> ApiResult<()> {
    info!(route = "/api/user/reset-password", "api http request");
    state
        .services
        .accounts
        .reset_password(&body.email, &body.otp, &body.password)
        .await?;
    Ok(done("Password reset successfully"))
}

pub async fn google_login(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<GoogleTokenRequest>,
) -> WithCookie<GoogleLoginPayload> {
    info!(route = "/api/user/google_login", "api http request");
    let google = state
        .services
        .accounts
        .google_login(&body.token, &meta.client())
        .await?;
    let headers = session_cookie(&state, &google.session.token)?;
    Ok((
        headers,
        ok(
            "User logged in successfully",
            GoogleLoginPayload {
                token: google.session.token.token,
                user_data: google.session.profile,
                is_new_user: google.created,
            },
        ),
    ))
}

pub async fn get_user_by_google_email(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<GoogleTokenRequest>,
) -> ApiResult<UserPayload> {
    info!(route = "/api/user/get_user_by_google_email", "api http request");
    let user = state.services.accounts.google_account(&body.token).await?;
    Ok(ok("User fetched", UserPayload { user }))
}

pub async fn get_all_users(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> ApiResult<UsersPayload> {
    info!(route = "/api/user/get_all_users", "api http request");
    let users = state.services.accounts.list_users(&actor).await?;
    Ok(ok("users fetched successfully", UsersPayload { users }))
}

pub async fn get_single_profile(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    meta: RequestMeta,
) -> ApiResult<UserPayload> {
    info!(route = "/api/user/get_single_profile", "api http request");
    let user = state
        .services
        .accounts
        .profile(&actor, &meta.client())
        .await?;
    Ok(ok("User fetched", UserPayload { user }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    meta: RequestMeta,
    JsonBody(body): JsonBody<UpdateProfileRequest>,
) -> ApiResult<UpdatedUserPayload> {
    info!(route = "/api/user/update_profile", "api http request");
    let data = state
        .services
        .accounts
        .update_profile(
            &actor,
            &meta.client(),
            ProfileUpdate {
                username: body.username,
                phone_number: body.phone_number,
                email: body.email,
                remember_device: body.remember_device,
            },
        )
        .await?;
    Ok(ok("User updated successfully", UpdatedUserPayload { data }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> WithCookie<()> {
    info!(route = "/api/user/delete", "api http request");
    state.services.accounts.delete_account(&actor).await?;
    Ok((cleared_cookie(&state)?, done("User deleted successfully")))
}

pub async fn logout_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> WithCookie<()> {
    info!(route = "/api/user/logout", "api http request");
    state.services.accounts.logout(&actor).await?;
    Ok((cleared_cookie(&state)?, done("Logged out successfully")))
}

#[cfg(test)]
mod tests {
    use booking_service::Actor;
    use external_services::{GoogleIdentity, StaticGoogleVerifier};
    use ticket_domain::UserId;

    use super::*;
    use crate::test_support::{ADMIN_EMAIL, PASSWORD, harness, harness_with, meta};

    fn registration(email: &str) -> RegisterRequest {
        RegisterRequest {
            username: "sita".to_string(),
            phone_number: "9800000000".to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
        }
    }

    fn set_cookie(headers: &HeaderMap) -> String {
        headers
            .get(SET_COOKIE)
            .expect("set-cookie")
            .to_str()
            .expect("ascii")
            .to_string()
    }

    #[tokio::test]
    async fn register_verify_then_login_from_same_device() {
        let h = harness();
        let (status, Json(created)) = create_user(
            State(h.state.clone()),
            JsonBody(registration("sita@example.com")),
        )
        .await
        .expect("register");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.message, "User Created Successfully!");
        assert!(!created.data.expect("user").user.is_verified);

        let code = h
            .mailer
            .last_code_for("sita@example.com")
            .expect("mailer")
            .expect("code");
        let (headers, Json(verified)) = verify_register_otp(
            State(h.state.clone()),
            meta(),
            JsonBody(OtpRequest {
                email: "sita@example.com".to_string(),
                otp: code,
            }),
        )
        .await
        .expect("verify");
        let cookie = set_cookie(&headers);
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly; Secure; SameSite=Strict; Max-Age=3600"));
        assert!(verified.data.expect("session").user_data.is_verified);

        // Verification recorded the device but did not remember it.
        let (_, Json(login)) = login_user(
            State(h.state.clone()),
            meta(),
            JsonBody(LoginRequest {
                email: "sita@example.com".to_string(),
                password: PASSWORD.to_string(),
                captcha_token: Some("captcha".to_string()),
            }),
        )
        .await
        .expect("login");
        let payload = login.data.expect("payload");
        assert_eq!(payload.otp_required, Some(true));
        assert!(payload.token.is_none());
    }

    #[tokio::test]
    async fn unverified_login_asks_for_registration_code() {
        let h = harness();
        create_user(
            State(h.state.clone()),
            JsonBody(registration("hari@example.com")),
        )
        .await
        .expect("register");

        let (headers, Json(login)) = login_user(
            State(h.state.clone()),
            meta(),
            JsonBody(LoginRequest {
                email: "hari@example.com".to_string(),
                password: PASSWORD.to_string(),
                captcha_token: Some("captcha".to_string()),
            }),
        )
        .await
        .expect("login");
        assert!(headers.get(SET_COOKIE).is_none());
        let body = serde_json::to_value(&login).expect("json");
        assert_eq!(body["registerOtpRequired"], true);
        assert!(body.get("otpRequired").is_none());
    }

    #[tokio::test]
    async fn bad_login_reports_missing_captcha() {
        let h = harness();
        let err = login_user(
            State(h.state.clone()),
            meta(),
            JsonBody(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: PASSWORD.to_string(),
                captcha_token: None,
            }),
        )
        .await
        .expect_err("captcha required");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_email_registers_admin_and_lists_users() {
        let h = harness();
        let (_, Json(created)) =
            create_user(State(h.state.clone()), JsonBody(registration(ADMIN_EMAIL)))
                .await
                .expect("register");
        let admin = created.data.expect("user").user;
        assert!(admin.is_admin);

        let Json(listed) = get_all_users(
            State(h.state.clone()),
            AdminUser(Actor::admin(admin.id)),
        )
        .await
        .expect("list");
        assert_eq!(listed.data.expect("users").users.len(), 1);
    }

    #[tokio::test]
    async fn profile_update_remembers_device_and_logout_clears_cookie() {
        let h = harness();
        let (_, Json(created)) = create_user(
            State(h.state.clone()),
            JsonBody(registration("gita@example.com")),
        )
        .await
        .expect("register");
        let actor = Actor::user(created.data.expect("user").user.id);

        let Json(updated) = update_profile(
            State(h.state.clone()),
            AuthUser(actor),
            meta(),
            JsonBody(UpdateProfileRequest {
                username: Some("gita k".to_string()),
                remember_device: Some(true),
                ..UpdateProfileRequest::default()
            }),
        )
        .await
        .expect("update");
        let data = updated.data.expect("data").data;
        assert_eq!(data.username, "gita k");
        assert!(data.remember_device);

        let Json(profile) =
            get_single_profile(State(h.state.clone()), AuthUser(actor), meta())
                .await
                .expect("profile");
        assert_eq!(
            profile.data.expect("user").user.remembered_devices,
            vec![meta().device]
        );

        let (headers, Json(out)) = logout_user(State(h.state.clone()), AuthUser(actor))
            .await
            .expect("logout");
        assert!(out.success);
        assert!(set_cookie(&headers).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let h = harness();
        let err = forgot_password(
            State(h.state.clone()),
            JsonBody(ForgotPasswordRequest {
                email: "ghost@example.com".to_string(),
            }),
        )
        .await
        .expect_err("unknown");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.0.to_string(), "User not found");
    }

    #[tokio::test]
    async fn google_login_creates_then_reuses_account() {
        let google = StaticGoogleVerifier::default().with_identity(
            "google-token",
            GoogleIdentity {
                email: "ram@gmail.com".to_string(),
                name: Some("Ram".to_string()),
                email_verified: true,
            },
        );
        let h = harness_with(google);
        let request = || GoogleTokenRequest {
            token: "google-token".to_string(),
        };

        let (headers, Json(first)) =
            google_login(State(h.state.clone()), meta(), JsonBody(request()))
                .await
                .expect("first");
        assert!(set_cookie(&headers).starts_with("token="));
        assert!(first.data.expect("payload").is_new_user);

        let (_, Json(second)) = google_login(State(h.state.clone()), meta(), JsonBody(request()))
            .await
            .expect("second");
        assert!(!second.data.expect("payload").is_new_user);

        let Json(found) = get_user_by_google_email(State(h.state.clone()), JsonBody(request()))
            .await
            .expect("lookup");
        assert_eq!(found.data.expect("user").user.email, "ram@gmail.com");

        let err = google_login(
            State(h.state.clone()),
            meta(),
            JsonBody(GoogleTokenRequest {
                token: "forged".to_string(),
            }),
        )
        .await
        .expect_err("forged");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deleting_a_missing_account_is_not_found() {
        let h = harness();
        let err = delete_user(State(h.state.clone()), AuthUser(Actor::user(UserId::new())))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
