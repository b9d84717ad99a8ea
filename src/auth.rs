use anyhow::anyhow;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::Utc;
use log::info;
use rand::Rng;
use rocket::form::{self, Contextual, Form};
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{Template, context};

use crate::account::{AccountRecord, find_account_by_email};
use crate::db::DbPool;
use crate::util::{FormResponse, flash_note, is_unique_violation, status_any_error, status_sqlx_error};
use crate::{AccountSession, AppConfig, SessionId, SharedAppState};

pub const SESSION_COOKIE: &str = "fitclub_session_id";

pub fn generate_random_string(len: usize) -> String {
    const VOWELS: &str = "aeiouy";
    const CONSONANTS: &str = "bcdfghjklmnopqrstvwxz";
    let mut rng = rand::rng();
    (0..len)
        .map(|n| {
            let charset = if n % 2 == 0 { CONSONANTS } else { VOWELS };
            let idx = rng.random_range(0..charset.len());
            charset.chars().nth(idx).unwrap()
        })
        .collect()
}

/// Argon2id digest in PHC string form; the raw secret is never stored.
pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("{e}"))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn valid_email<'v>(value: &str) -> form::Result<'v, ()> {
    let ok = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if !ok {
        Err(form::Error::validation("invalid email address"))?;
    }
    Ok(())
}

#[derive(Debug, FromForm)]
struct LoginForm<'v> {
    #[field(validate = len(5..=50))]
    #[field(validate = valid_email())]
    email: &'v str,
    #[field(validate = len(5..=80))]
    password: &'v str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromFormField)]
enum Gender {
    #[field(value = "male")]
    Male,
    #[field(value = "female")]
    Female,
}
impl Gender {
    fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromFormField)]
enum PaymentMethod {
    #[field(value = "credit card")]
    CreditCard,
    #[field(value = "cash")]
    Cash,
}
impl PaymentMethod {
    fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit card",
            PaymentMethod::Cash => "cash",
        }
    }
}

#[derive(Debug, FromForm)]
struct SignupForm<'v> {
    #[field(validate = len(3..=20))]
    first_name: &'v str,
    #[field(validate = len(2..=20))]
    last_name: &'v str,
    #[field(validate = len(1..=40))]
    #[field(validate = valid_email())]
    email: &'v str,
    #[field(validate = len(5..=80))]
    password: &'v str,
    gender: Gender,
    payment_method: PaymentMethod,
}

fn render_login(flash: Option<FlashMessage<'_>>, ctx: &form::Context<'_>) -> Template {
    let errors = ctx.errors().map(|e| e.to_string()).collect::<Vec<_>>();
    Template::render("login", context! {
        flash: flash_note(flash),
        errors,
        email: ctx.field_value("email"),
    })
}

#[get("/login")]
fn login_page(flash: Option<FlashMessage<'_>>) -> Template {
    render_login(flash, &form::Context::default())
}

#[post("/login", data = "<form>")]
async fn post_login<'r>(form: Form<Contextual<'r, LoginForm<'r>>>, cookies: &CookieJar<'_>, cfg: &State<AppConfig>, state: &State<SharedAppState>, db: &State<DbPool>) -> Result<FormResponse, Custom<String>> {
    let Some(vals) = form.value.as_ref() else {
        return Ok(FormResponse::Page(render_login(None, &form.context)));
    };
    let Some(account) = find_account_by_email(vals.email, db).await? else {
        return Ok(invalid_credentials());
    };
    if !verify_password(&account.password_hash, vals.password) {
        return Ok(invalid_credentials());
    }
    establish_session(&account, cfg, state, cookies);
    info!("Account logged in: {}", account.email);
    Ok(FormResponse::Redirect(Flash::success(Redirect::to("/homepage"), "Welcome back!")))
}

// one message for both unknown email and wrong password
fn invalid_credentials() -> FormResponse {
    FormResponse::Redirect(Flash::error(Redirect::to("/login"), "Invalid email or password. Please try again."))
}

fn establish_session(account: &AccountRecord, cfg: &AppConfig, state: &SharedAppState, cookies: &CookieJar<'_>) {
    let session = AccountSession {
        account_id: account.id,
        email: account.email.clone(),
        first_name: account.first_name.clone(),
        is_admin: cfg.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(&account.email)),
        created: Utc::now(),
    };
    let session_id = generate_random_string(32);
    let mut state = state.write().expect("not poisoned");
    state.sessions.retain(|_, s| !s.expired(cfg.session_timeout_minutes));
    state.sessions.insert(SessionId(session_id.clone()), session);
    cookies.add_private(
        Cookie::build((SESSION_COOKIE, session_id))
            .same_site(SameSite::Lax)
            .build(),
    );
}

fn render_signup(flash: Option<FlashMessage<'_>>, ctx: &form::Context<'_>) -> Template {
    let errors = ctx.errors().map(|e| e.to_string()).collect::<Vec<_>>();
    Template::render("signup", context! {
        flash: flash_note(flash),
        errors,
        first_name: ctx.field_value("first_name"),
        last_name: ctx.field_value("last_name"),
        email: ctx.field_value("email"),
    })
}

#[get("/signup")]
fn signup_page(flash: Option<FlashMessage<'_>>) -> Template {
    render_signup(flash, &form::Context::default())
}

#[post("/signup", data = "<form>")]
async fn post_signup<'r>(form: Form<Contextual<'r, SignupForm<'r>>>, db: &State<DbPool>) -> Result<FormResponse, Custom<String>> {
    let Some(vals) = form.value.as_ref() else {
        return Ok(FormResponse::Page(render_signup(None, &form.context)));
    };
    if find_account_by_email(vals.email, db).await?.is_some() {
        return Ok(duplicate_email());
    }
    let password_hash = hash_password(vals.password).map_err(status_any_error)?;
    let res = sqlx::query("INSERT INTO accounts (first_name, last_name, email, password_hash, gender, payment_method) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(vals.first_name)
        .bind(vals.last_name)
        .bind(vals.email)
        .bind(&password_hash)
        .bind(vals.gender.as_str())
        .bind(vals.payment_method.as_str())
        .execute(&db.0)
        .await;
    match res {
        Ok(_) => {
            info!("Account created: {}", vals.email);
            Ok(FormResponse::Redirect(Flash::success(Redirect::to("/signup"), "Account Created!")))
        }
        // two signups racing on the same email; the UNIQUE constraint is the backstop
        Err(err) if is_unique_violation(&err) => Ok(duplicate_email()),
        Err(err) => Err(status_sqlx_error(err)),
    }
}

fn duplicate_email() -> FormResponse {
    FormResponse::Redirect(Flash::error(Redirect::to("/signup"), "An account with this email already exists!"))
}

#[get("/logout")]
fn logout(session_id: SessionId, state: &State<SharedAppState>, cookies: &CookieJar<'_>) -> Flash<Redirect> {
    state.write().expect("not poisoned").sessions.remove(&session_id);
    cookies.remove_private(Cookie::from(SESSION_COOKIE));
    Flash::success(Redirect::to("/"), "Successfully Logged out!")
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            login_page,
            post_login,
            signup_page,
            post_signup,
            logout,
        ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("s3cret").unwrap();
        assert_ne!(hash, "s3cret");
        assert!(verify_password(&hash, "s3cret"));
        assert!(!verify_password(&hash, "s3cret "));
        assert!(!verify_password("not-a-phc-string", "s3cret"));
    }

    #[test]
    fn generated_session_ids_differ() {
        let a = generate_random_string(32);
        let b = generate_random_string(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn email_syntax() {
        assert!(valid_email("jane@fit.example").is_ok());
        assert!(valid_email("janefit.example").is_err());
        assert!(valid_email("@fit.example").is_err());
        assert!(valid_email("jane@fitexample").is_err());
        assert!(valid_email("jane@.example").is_err());
    }
}
