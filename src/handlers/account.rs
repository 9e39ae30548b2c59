use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;

use crate::{
    AppState,
    auth::{
        MaybeAuthUser, expired_session_cookie, hash_password, issue_token, session_cookie,
        verify_password,
    },
    config::Env,
    errors::AppResult,
    forms::{FormErrors, LoginForm, NON_FIELD, RegistrationForm, validate_form},
    models::NewUser,
    repository::is_unique_violation,
};

const DUPLICATE_USERNAME: &str = "A user with that username already exists.";

const BAD_CREDENTIALS: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Keeps `next` only when it is a path on this site.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|path| {
        path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
    })
}

// --- Registration ---

/// registration_form
///
/// GET /auth/registration/
pub async fn registration_form(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    render_registration(&state, &viewer, &RegistrationForm::default(), &FormErrors::default())
}

/// register
///
/// POST /auth/registration/ : creates the account and sends the new user to the login page.
pub async fn register(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Form(mut form): Form<RegistrationForm>,
) -> AppResult<Response> {
    form.normalize();
    let mut errors = validate_form(&form);
    if !form.username.is_empty()
        && state.repo.get_user_by_username(&form.username).await?.is_some()
    {
        errors.add("username", DUPLICATE_USERNAME);
    }
    if !errors.is_empty() {
        return render_registration(&state, &viewer, &form, &errors);
    }

    let password_hash = hash_password(&form.password1, state.config.password_hash_cost)?;
    let created = state
        .repo
        .create_user(NewUser {
            username: form.username.clone(),
            email: form.email.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            password_hash,
        })
        .await;
    let user = match created {
        Ok(user) => user,
        // A concurrent sign-up took the name between the check and the insert.
        Err(e) if is_unique_violation(&e) => {
            errors.add("username", DUPLICATE_USERNAME);
            return render_registration(&state, &viewer, &form, &errors);
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok(Redirect::to("/auth/login/").into_response())
}

fn render_registration(
    state: &AppState,
    viewer: &MaybeAuthUser,
    form: &RegistrationForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let html = state.templates.render(
        "registration/registration_form.html",
        &json!({ "user": viewer.0, "form": form, "errors": errors }),
    )?;
    Ok(html.into_response())
}

// --- Login / Logout ---

/// login_form
///
/// GET /auth/login/ : `next` is carried through the form as a hidden field.
pub async fn login_form(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
) -> AppResult<Response> {
    let form = LoginForm {
        next: safe_next(query.next.as_deref()).map(str::to_string),
        ..LoginForm::default()
    };
    render_login(&state, &viewer, &form, &FormErrors::default())
}

/// login
///
/// POST /auth/login/ : on matching credentials stores a signed session token in the cookie
/// and redirects to `next` or the index.
pub async fn login(
    viewer: MaybeAuthUser,
    cookies: Cookies,
    State(state): State<AppState>,
    Form(mut form): Form<LoginForm>,
) -> AppResult<Response> {
    form.username = form.username.trim().to_string();
    let mut errors = validate_form(&form);
    if !errors.is_empty() {
        return render_login(&state, &viewer, &form, &errors);
    }

    let account = state.repo.get_user_by_username(&form.username).await?;
    let account = match account {
        Some(account) if verify_password(&form.password, &account.password_hash) => account,
        _ => {
            tracing::debug!("Failed login for {}", form.username);
            errors.add(NON_FIELD, BAD_CREDENTIALS);
            return render_login(&state, &viewer, &form, &errors);
        }
    };

    let config = &state.config;
    let token = issue_token(account.id, &config.session_secret, config.session_ttl_hours)?;
    cookies.add(session_cookie(
        token,
        config.session_ttl_hours,
        config.env == Env::Production,
    ));
    let target = safe_next(form.next.as_deref()).unwrap_or("/");
    tracing::info!("User {} logged in", account.id);
    Ok(Redirect::to(target).into_response())
}

fn render_login(
    state: &AppState,
    viewer: &MaybeAuthUser,
    form: &LoginForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let html = state.templates.render(
        "registration/login.html",
        &json!({ "user": viewer.0, "form": form, "errors": errors }),
    )?;
    Ok(html.into_response())
}

/// logout
///
/// GET|POST /auth/logout/ : drops the session cookie.
pub async fn logout(cookies: Cookies) -> Redirect {
    cookies.remove(expired_session_cookie());
    Redirect::to("/")
}
