use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use scribe_db::{Database, applications, users};
use scribe_types::api::{
    AuthResponse, Claims, ForgotPasswordRequest, LoginRequest, MeResponse, RegisterRequest,
    ResetPasswordRequest, SetAccountStatusRequest, UpdatePasswordRequest, UserListQuery,
    UserProfile, UserSummary, VerifyEmailRequest,
};
use scribe_types::application::Application;
use scribe_types::stats::EarningsStats;
use scribe_types::user::{
    MIN_PASSWORD_LEN, NewWriter, ProfileUpdate, Role, User, normalize_email, token_digest,
};

use crate::error::ApiError;
use crate::mail::{reset_body, verification_body};
use crate::message;
use crate::state::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_password(&req.password)?;

    let (user, app, code) = blocking(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        let mut user = User::new_writer(
            NewWriter {
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                phone: req.phone,
                country: req.country,
            },
            password_hash,
        )?;
        let code = user.issue_email_verification(Utc::now());
        let app = Application::new(user.id);

        db.with_tx(|tx| {
            users::insert(tx, &user)?;
            applications::insert(tx, &app)
        })?;
        Ok((user, app, code))
    })
    .await?;

    info!("Registered writer {} <{}>", user.id, user.email);
    state
        .mailer
        .send(&user.email, "Verify your email", &verification_body(&code));

    let token = create_token(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserSummary::new(&user, Some(&app)),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email).map_err(|_| ApiError::InvalidCredentials)?;

    let (user, app) = blocking(&state, move |db| {
        let mut user = db
            .get_user_by_email(&email)?
            .ok_or(ApiError::InvalidCredentials)?;
        verify_password(&req.password, &user.password_hash)?;
        if user.is_suspended() {
            return Err(ApiError::Forbidden("account suspended"));
        }

        user.record_login(Utc::now());
        db.update_user(&mut user)?;
        let app = writer_application(db, &user)?;
        Ok((user, app))
    })
    .await?;

    info!("User {} logged in", user.id);
    let token = create_token(&state, &user)?;
    Ok(Json(AuthResponse {
        token,
        user: UserSummary::new(&user, app.as_ref()),
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let user_id = blocking(&state, move |db| {
        let mut user = db.get_user_by_email(&email)?.ok_or(ApiError::NotFound("user"))?;
        user.verify_email(req.code.trim(), Utc::now())?;
        db.update_user(&mut user)?;
        Ok(user.id)
    })
    .await?;

    info!("User {} verified their email", user_id);
    Ok(message("email verified"))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (email, code) = blocking(&state, move |db| {
        let mut user = db.get_user(claims.sub)?.ok_or(ApiError::NotFound("user"))?;
        if user.email_verified {
            return Err(ApiError::BadRequest("email already verified".into()));
        }
        let code = user.issue_email_verification(Utc::now());
        db.update_user(&mut user)?;
        Ok((user.email, code))
    })
    .await?;

    state
        .mailer
        .send(&email, "Verify your email", &verification_body(&code));
    Ok(message("verification code sent"))
}

/// Always answers the same way, so the endpoint cannot be used to probe
/// which addresses are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let issued = blocking(&state, move |db| {
        let Some(mut user) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let token = user.issue_password_reset(Utc::now());
        db.update_user(&mut user)?;
        Ok(Some((user.email, token)))
    })
    .await?;

    if let Some((email, token)) = issued {
        state
            .mailer
            .send(&email, "Password reset", &reset_body(&token));
    }
    Ok(message("if that email is registered, a reset token has been sent"))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_password(&req.password)?;
    let digest = token_digest(req.token.trim());

    let (user, app) = blocking(&state, move |db| {
        let mut user = db
            .get_user_by_reset_digest(&digest)?
            .ok_or_else(|| ApiError::BadRequest("invalid or expired reset token".into()))?;
        let password_hash = hash_password(&req.password)?;
        user.reset_password(req.token.trim(), password_hash, Utc::now())?;
        db.update_user(&mut user)?;
        let app = writer_application(db, &user)?;
        Ok((user, app))
    })
    .await?;

    info!("User {} reset their password", user.id);
    let token = create_token(&state, &user)?;
    Ok(Json(AuthResponse {
        token,
        user: UserSummary::new(&user, app.as_ref()),
    }))
}

pub async fn update_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_password(&req.new_password)?;

    let (user, app) = blocking(&state, move |db| {
        let mut user = db.get_user(claims.sub)?.ok_or(ApiError::NotFound("user"))?;
        verify_password(&req.current_password, &user.password_hash)
            .map_err(|_| ApiError::BadRequest("current password is incorrect".into()))?;
        user.password_hash = hash_password(&req.new_password)?;
        db.update_user(&mut user)?;
        let app = writer_application(db, &user)?;
        Ok((user, app))
    })
    .await?;

    info!("User {} changed their password", user.id);
    let token = create_token(&state, &user)?;
    Ok(Json(AuthResponse {
        token,
        user: UserSummary::new(&user, app.as_ref()),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |db| {
        let user = db.get_user(claims.sub)?.ok_or(ApiError::NotFound("user"))?;
        let application = writer_application(db, &user)?;
        let earnings = if user.is_admin() {
            None
        } else {
            let all = db.earnings_for_writer(user.id, None, None)?;
            Some(EarningsStats::from_earnings(&all))
        };
        Ok(MeResponse {
            user: UserProfile::from(&user),
            application: application.as_ref().map(Into::into),
            earnings,
        })
    })
    .await?;

    Ok(Json(response))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |db| {
        let mut user = db.get_user(claims.sub)?.ok_or(ApiError::NotFound("user"))?;
        user.update_profile(req)?;
        db.update_user(&mut user)?;
        Ok(user)
    })
    .await?;

    info!("User {} updated their profile", user.id);
    Ok(Json(UserProfile::from(&user)))
}

/// Tokens are stateless; the client just drops its copy.
pub async fn logout(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    info!("User {} logged out", claims.sub);
    message("logged out")
}

// -- Admin --

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |db| Ok(db.list_users(query.role, query.status)?)).await?;
    let profiles: Vec<UserProfile> = users.iter().map(UserProfile::from).collect();
    Ok(Json(profiles))
}

pub async fn set_user_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetAccountStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |db| {
        let mut user = db.get_user(user_id)?.ok_or(ApiError::NotFound("user"))?;
        user.set_status(req.status);
        db.update_user(&mut user)?;
        Ok(user)
    })
    .await?;

    info!("Admin {} set user {} status to {}", claims.sub, user.id, user.status);
    Ok(Json(UserProfile::from(&user)))
}

// -- Helpers --

fn writer_application(db: &Database, user: &User) -> Result<Option<Application>, ApiError> {
    if user.role == Role::Admin {
        return Ok(None);
    }
    Ok(db.get_application_by_writer(user.id)?)
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        ApiError::Internal(anyhow::anyhow!("stored password hash is corrupt: {}", e))
    })?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

pub(crate) fn create_token(state: &AppState, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        exp: (Utc::now() + chrono::Duration::days(state.token_ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Create the admin account on first start. An existing account with the
/// same email is left untouched.
pub fn bootstrap_admin(db: &Database, profile: NewWriter, password: &str) -> anyhow::Result<User> {
    let email = normalize_email(&profile.email)?;
    if let Some(existing) = db.get_user_by_email(&email)? {
        if existing.role != Role::Admin {
            anyhow::bail!("{} is registered but is not an admin", email);
        }
        return Ok(existing);
    }

    let admin = User::new_admin(profile, hash_password(password)?)?;
    db.insert_user(&admin)?;
    info!("Created admin account {} <{}>", admin.id, admin.email);
    Ok(admin)
}
