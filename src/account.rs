use chrono::{DateTime, Utc};
use rocket::form::{self, Contextual, Form};
use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{Template, context};
use serde::Serialize;
use sqlx::FromRow;

use crate::auth::{hash_password, verify_password};
use crate::db::DbPool;
use crate::util::{FormResponse, flash_note, status_any_error, status_sqlx_error};
use crate::{AccountSession, CurrentAccount};

pub type AccountId = i64;

#[derive(Serialize, FromRow, Clone, Debug)]
pub struct AccountRecord {
    pub id: AccountId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub gender: String,
    pub payment_method: String,
    pub created: DateTime<Utc>,
}

pub async fn find_account_by_email(email: &str, db: &State<DbPool>) -> Result<Option<AccountRecord>, Custom<String>> {
    sqlx::query_as("SELECT * FROM accounts WHERE email=?")
        .bind(email)
        .fetch_optional(&db.0)
        .await
        .map_err(status_sqlx_error)
}

pub async fn load_account(email: &str, db: &State<DbPool>) -> Result<AccountRecord, Custom<String>> {
    sqlx::query_as("SELECT * FROM accounts WHERE email=?")
        .bind(email)
        .fetch_one(&db.0)
        .await
        .map_err(status_sqlx_error)
}

#[get("/homepage")]
fn homepage(account: CurrentAccount, flash: Option<FlashMessage<'_>>) -> Template {
    Template::render("homepage", context! {
        user: &account.0,
        flash: flash_note(flash),
    })
}

#[get("/myaccount")]
async fn myaccount(account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let record = load_account(&account.0.email, db).await?;
    Ok(Template::render("myaccount", context! {
        user: &account.0,
        account: record,
    }))
}

#[derive(Debug, FromForm)]
struct ChangePasswordForm<'v> {
    #[field(validate = len(5..=80))]
    old_password: &'v str,
    #[field(validate = len(5..=80))]
    new_password1: &'v str,
    #[field(validate = len(5..=80))]
    new_password2: &'v str,
}

fn render_change_password(user: &AccountSession, flash: Option<FlashMessage<'_>>, ctx: &form::Context<'_>) -> Template {
    let errors = ctx.errors().map(|e| e.to_string()).collect::<Vec<_>>();
    Template::render("changepassword", context! {
        user,
        flash: flash_note(flash),
        errors,
    })
}

#[get("/changepassword")]
fn change_password_page(account: CurrentAccount, flash: Option<FlashMessage<'_>>) -> Template {
    render_change_password(&account.0, flash, &form::Context::default())
}

#[post("/changepassword", data = "<form>")]
async fn post_change_password<'r>(account: CurrentAccount, form: Form<Contextual<'r, ChangePasswordForm<'r>>>, db: &State<DbPool>) -> Result<FormResponse, Custom<String>> {
    let Some(vals) = form.value.as_ref() else {
        return Ok(FormResponse::Page(render_change_password(&account.0, None, &form.context)));
    };
    let record = load_account(&account.0.email, db).await?;
    let note = if !verify_password(&record.password_hash, vals.old_password) {
        Flash::error(Redirect::to("/changepassword"), "Incorrect Password")
    } else if vals.new_password1 != vals.new_password2 {
        Flash::error(Redirect::to("/changepassword"), "Passwords do not match")
    } else {
        let password_hash = hash_password(vals.new_password1).map_err(status_any_error)?;
        sqlx::query("UPDATE accounts SET password_hash=? WHERE id=?")
            .bind(&password_hash)
            .bind(record.id)
            .execute(&db.0)
            .await
            .map_err(status_sqlx_error)?;
        Flash::success(Redirect::to("/changepassword"), "Password successfully updated!")
    };
    Ok(FormResponse::Redirect(note))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            homepage,
            myaccount,
            change_password_page,
            post_change_password,
        ])
}
