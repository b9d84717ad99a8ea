#[macro_use] extern crate rocket;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use rocket::http::{CookieJar, Status};
use rocket::request::{self, FlashMessage, Request};
use rocket_dyn_templates::{Template, context, handlebars};
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use serde::Serialize;

use crate::account::AccountId;
use crate::db::DbPoolFairing;
use crate::util::{FlashNote, flash_note, titlecase};

#[cfg(test)]
mod tests;
mod account;
mod auth;
mod classes;
mod db;
mod enrollment;
mod util;

const DEFAULT_SESSION_TIMEOUT_MINUTES: i64 = 120;

pub struct AppConfig {
    /// Sessions older than this are treated as logged out; 0 disables expiry.
    pub session_timeout_minutes: i64,
    /// Accounts allowed to use the class administration pages.
    pub admin_emails: Vec<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct AccountSession {
    pub account_id: AccountId,
    pub email: String,
    pub first_name: String,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
}
impl AccountSession {
    fn expired(&self, timeout_minutes: i64) -> bool {
        timeout_minutes > 0
            && Utc::now().signed_duration_since(self.created) >= Duration::minutes(timeout_minutes)
    }
}

#[derive(Eq, Hash, PartialEq)]
pub struct SessionId(String);

#[rocket::async_trait]
impl<'r> request::FromRequest<'r> for SessionId {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<SessionId, ()> {
        let cookies = request
            .guard::<&CookieJar<'_>>()
            .await
            .expect("request cookies");
        if let Some(cookie) = cookies.get_private(auth::SESSION_COOKIE) {
            return request::Outcome::Success(SessionId(cookie.value().to_string()));
        }
        request::Outcome::Forward(Status::Unauthorized)
    }
}

/// Guard for routes which need a logged-in account. Forwards to the 401
/// catcher when there is no live session.
pub struct CurrentAccount(pub AccountSession);

#[rocket::async_trait]
impl<'r> request::FromRequest<'r> for CurrentAccount {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<CurrentAccount, ()> {
        let session_id = match request.guard::<SessionId>().await {
            request::Outcome::Success(session_id) => session_id,
            _ => return request::Outcome::Forward(Status::Unauthorized),
        };
        let state = request
            .rocket()
            .state::<SharedAppState>()
            .expect("session state is managed");
        let cfg = request
            .rocket()
            .state::<AppConfig>()
            .expect("app config is managed");
        let session = state.read().expect("not poisoned").sessions.get(&session_id).cloned();
        match session {
            Some(session) if !session.expired(cfg.session_timeout_minutes) => {
                request::Outcome::Success(CurrentAccount(session))
            }
            Some(_) => {
                state.write().expect("not poisoned").sessions.remove(&session_id);
                request::Outcome::Forward(Status::Unauthorized)
            }
            None => request::Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Guard for the class administration routes.
pub struct AdminAccount(pub AccountSession);

#[rocket::async_trait]
impl<'r> request::FromRequest<'r> for AdminAccount {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<AdminAccount, ()> {
        match request.guard::<CurrentAccount>().await {
            request::Outcome::Success(account) if account.0.is_admin => {
                request::Outcome::Success(AdminAccount(account.0))
            }
            request::Outcome::Success(_) => request::Outcome::Forward(Status::Forbidden),
            request::Outcome::Forward(status) => request::Outcome::Forward(status),
            request::Outcome::Error(err) => request::Outcome::Error(err),
        }
    }
}

#[derive(Default)]
pub struct AppState {
    sessions: HashMap<SessionId, AccountSession>,
}
pub type SharedAppState = RwLock<AppState>;

#[get("/")]
fn index(user: Option<CurrentAccount>, flash: Option<FlashMessage<'_>>) -> Template {
    Template::render("index", context! {
        user: user.map(|u| u.0),
        flash: flash_note(flash),
    })
}

#[get("/contactus1")]
fn contactus1(user: Option<CurrentAccount>) -> Template {
    Template::render("contactus1", context! { user: user.map(|u| u.0) })
}

#[get("/contactus2")]
fn contactus2(user: Option<CurrentAccount>) -> Template {
    Template::render("contactus2", context! { user: user.map(|u| u.0) })
}

#[catch(401)]
fn unauthorized() -> Template {
    // the login view doubles as the "login required" page
    Template::render("login", context! {
        flash: FlashNote { kind: "danger".to_string(), message: "Please log in first!".to_string() },
        errors: Vec::<String>::new(),
        email: None::<&str>,
    })
}

#[catch(403)]
fn forbidden() -> &'static str {
    "Administrator access is required for this page."
}

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::custom(|engines| {
            let handlebars = &mut engines.handlebars;

            handlebars.register_helper("titlecase",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("titlecase", 0))?.value();
                                           out.write(&titlecase(val.as_str().unwrap_or_default()))?;
                                           Ok(())
                                       }));
        }))
        .attach(DbPoolFairing())
        .register("/", catchers![unauthorized, forbidden])
        .mount("/", routes![
            index,
            contactus1,
            contactus2,
        ]);
    let rocket = auth::extend(rocket);
    let rocket = account::extend(rocket);
    let rocket = classes::extend(rocket);
    let rocket = enrollment::extend(rocket);

    let figment = rocket.figment();
    let cfg = AppConfig {
        session_timeout_minutes: figment
            .extract_inner("session_timeout_minutes")
            .unwrap_or(DEFAULT_SESSION_TIMEOUT_MINUTES),
        admin_emails: figment.extract_inner("admin_emails").unwrap_or_default(),
    };
    let rocket = rocket.manage(cfg);

    rocket.manage(SharedAppState::new(AppState::default()))
}
